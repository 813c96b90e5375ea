//! Builds the JWT authentication HTTP filter for a listener.
//!
//! A request satisfies a route's JWT policy when any one of the route's providers validates
//! its token. Providers are deduplicated by content across all routes on a listener, so two
//! providers that differ only by name share one entry, keyed by the first name seen.

use crate::{
    cluster::{jwks_cluster, JwksEndpoint},
    resolve::Resolve,
    route::route_match,
    wellknown::{self, seconds, types},
    Error,
};
use envoy_types::pb::{
    envoy::{
        config::{
            cluster::v3::Cluster,
            core::v3::{http_uri::HttpUpstreamType, HttpUri},
            route::v3::RouteMatch,
        },
        extensions::filters::{
            http::jwt_authn::v3::{
                jwt_provider::JwksSourceSpecifier, jwt_requirement::RequiresType,
                requirement_rule::RequirementType, JwtAuthentication,
                JwtProvider as EnvoyJwtProvider, JwtRequirement, JwtRequirementAndList,
                JwtRequirementOrList, RemoteJwks, RequirementRule,
            },
            network::http_connection_manager::v3::{http_filter, HttpFilter},
        },
    },
    google::protobuf::Empty,
};
use gateway_controller_core as ir;

const REMOTE_JWKS_TIMEOUT_SECS: i64 = 5;
const REMOTE_JWKS_CACHE_DURATION_SECS: i64 = 5 * 60;

/// Where JWT requirements are attached.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum JwtScope {
    /// One rule matching every path on the listener, requiring any of the listener's
    /// providers.
    #[default]
    Listener,

    /// One rule per authenticated route, matching the route's path and requiring any of
    /// that route's providers.
    Route,
}

/// A listener's JWT authentication filter config and the clusters its providers fetch keys
/// through.
#[derive(Clone, Debug, PartialEq)]
pub struct JwtAuthn {
    pub config: JwtAuthentication,
    pub clusters: Vec<Cluster>,
}

// === impl JwtAuthn ===

impl JwtAuthn {
    pub fn http_filter(&self) -> HttpFilter {
        HttpFilter {
            name: wellknown::JWT_AUTHN.to_string(),
            config_type: Some(http_filter::ConfigType::TypedConfig(wellknown::to_any(
                types::JWT_AUTHENTICATION,
                &self.config,
            ))),
            ..Default::default()
        }
    }
}

/// Builds the JWT authentication filter for `listener`.
///
/// Fails with [`Error::NoJwtProviders`] when no route on the listener configures a JWT
/// provider, and with [`Error::ConflictingJwtProvider`] when providers that are not
/// equivalent share a name.
pub fn build_jwt_authn(
    listener: &ir::HttpListener,
    scope: JwtScope,
    resolver: &impl Resolve,
) -> Result<JwtAuthn, Error> {
    let unique = unique_jwt_providers(&listener.routes);
    if unique.is_empty() {
        return Err(Error::NoJwtProviders(listener.name.clone()));
    }

    let mut providers = Vec::with_capacity(unique.len());
    let mut clusters = Vec::<Cluster>::new();
    for (i, provider) in unique.iter().enumerate() {
        if unique[..i].iter().any(|p| p.name == provider.name) {
            return Err(Error::ConflictingJwtProvider {
                listener: listener.name.clone(),
                provider: provider.name.clone(),
            });
        }

        let endpoint = JwksEndpoint::parse(&provider.remote_jwks.uri)?;
        let cluster_name = endpoint.cluster_name();
        if !clusters.iter().any(|c| c.name == cluster_name) {
            clusters.push(jwks_cluster(&endpoint, resolver)?);
        }
        providers.push((provider.name.clone(), envoy_provider(provider, cluster_name)));
    }

    let rules = match scope {
        JwtScope::Listener => {
            let names = unique.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();
            compose_requirement(&names)
                .map(|requires| requirement_rule(prefix_match("/"), requires))
                .into_iter()
                .collect()
        }
        JwtScope::Route => listener
            .routes
            .iter()
            .filter_map(|route| {
                // Each of the route's providers is referenced by its canonical name.
                let mut names = Vec::new();
                for provider in route.jwt_providers() {
                    let name = canonical_name(&unique, provider);
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                let requires = compose_requirement(&names)?;
                Some(requirement_rule(route_match(&route.path_match), requires))
            })
            .collect(),
    };

    tracing::debug!(
        listener = %listener.name,
        providers = providers.len(),
        clusters = clusters.len(),
        "Built JWT authentication",
    );
    Ok(JwtAuthn {
        config: JwtAuthentication {
            providers: providers.into_iter().collect(),
            rules,
            bypass_cors_preflight: true,
            ..Default::default()
        },
        clusters,
    })
}

/// Returns the JWT providers of `routes` in order, dropping any provider equivalent to one
/// already returned.
pub fn unique_jwt_providers<'r>(
    routes: impl IntoIterator<Item = &'r ir::HttpRoute>,
) -> Vec<&'r ir::JwtProvider> {
    let mut unique = Vec::<&ir::JwtProvider>::new();
    for route in routes {
        for provider in route.jwt_providers() {
            if !unique.iter().any(|p| p.is_equivalent(provider)) {
                unique.push(provider);
            }
        }
    }
    unique
}

/// Composes a requirement satisfied when any one of `providers` validates the token.
///
/// A single provider is required directly. For multiple providers the requirement is
///
/// ```text
/// any_of(P1, .., Pn, all_of(any_of(P1, allow_missing), .., any_of(Pn, allow_missing)))
/// ```
///
/// The inner `all_of` rejects a token that is present but invalid for every provider; the
/// outer `any_of` admits a token that only one provider recognizes when providers share an
/// extraction location.
pub fn compose_requirement(providers: &[&str]) -> Option<JwtRequirement> {
    match providers {
        [] => None,
        [provider] => Some(require_provider(provider)),
        providers => {
            let all = providers
                .iter()
                .map(|p| any_of(vec![require_provider(p), allow_missing()]))
                .collect();
            let mut any = providers
                .iter()
                .map(|p| require_provider(p))
                .collect::<Vec<_>>();
            any.push(JwtRequirement {
                requires_type: Some(RequiresType::RequiresAll(JwtRequirementAndList {
                    requirements: all,
                })),
            });
            Some(any_of(any))
        }
    }
}

fn canonical_name<'p>(unique: &[&'p ir::JwtProvider], provider: &'p ir::JwtProvider) -> &'p str {
    unique
        .iter()
        .find(|p| p.is_equivalent(provider))
        .map_or(provider.name.as_str(), |p| p.name.as_str())
}

fn envoy_provider(provider: &ir::JwtProvider, cluster: String) -> EnvoyJwtProvider {
    let remote = RemoteJwks {
        http_uri: Some(HttpUri {
            uri: provider.remote_jwks.uri.clone(),
            timeout: Some(seconds(REMOTE_JWKS_TIMEOUT_SECS)),
            http_upstream_type: Some(HttpUpstreamType::Cluster(cluster)),
        }),
        cache_duration: Some(seconds(REMOTE_JWKS_CACHE_DURATION_SECS)),
        ..Default::default()
    };

    EnvoyJwtProvider {
        issuer: provider.issuer.clone(),
        audiences: provider.audiences.clone(),
        jwks_source_specifier: Some(JwksSourceSpecifier::RemoteJwks(remote)),
        payload_in_metadata: provider.issuer.clone(),
        ..Default::default()
    }
}

fn requirement_rule(r#match: RouteMatch, requires: JwtRequirement) -> RequirementRule {
    RequirementRule {
        r#match: Some(r#match),
        requirement_type: Some(RequirementType::Requires(requires)),
    }
}

fn prefix_match(prefix: &str) -> RouteMatch {
    route_match(&ir::PathMatch::Prefix(prefix.to_string()))
}

fn require_provider(name: &str) -> JwtRequirement {
    JwtRequirement {
        requires_type: Some(RequiresType::ProviderName(name.to_string())),
    }
}

fn allow_missing() -> JwtRequirement {
    JwtRequirement {
        requires_type: Some(RequiresType::AllowMissing(Empty {})),
    }
}

fn any_of(requirements: Vec<JwtRequirement>) -> JwtRequirement {
    JwtRequirement {
        requires_type: Some(RequiresType::RequiresAny(JwtRequirementOrList { requirements })),
    }
}
