//! Upstream clusters for route destinations and remote JWKS endpoints.

use crate::{
    resolve::{resolve_ipv4, Resolve},
    wellknown::{self, seconds, socket_address, types},
    Error,
};
use envoy_types::pb::envoy::{
    config::{
        cluster::v3::{
            cluster::{ClusterDiscoveryType, DiscoveryType, DnsLookupFamily, LbPolicy},
            Cluster,
        },
        core::v3::{
            data_source, socket_address::Protocol, transport_socket, DataSource,
            Http2ProtocolOptions, TransportSocket,
        },
        endpoint::v3::{
            lb_endpoint::HostIdentifier, ClusterLoadAssignment, Endpoint, LbEndpoint,
            LocalityLbEndpoints,
        },
    },
    extensions::{
        transport_sockets::tls::v3::{
            common_tls_context::ValidationContextType, CertificateValidationContext,
            CommonTlsContext, UpstreamTlsContext,
        },
        upstreams::http::v3::{
            http_protocol_options::{
                explicit_http_config::ProtocolConfig, ExplicitHttpConfig,
                UpstreamProtocolOptions,
            },
            HttpProtocolOptions,
        },
    },
};
use gateway_controller_core as ir;
use url::{Host, Url};

/// The system trust bundle used to verify JWKS servers.
pub const CA_BUNDLE_PATH: &str = "/etc/ssl/certs/ca-certificates.crt";

const CONNECT_TIMEOUT_SECS: i64 = 10;
const DNS_REFRESH_SECS: i64 = 30;

/// The host and port of a remote JWKS URI.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct JwksEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

// === impl JwksEndpoint ===

impl JwksEndpoint {
    /// Parses an `http` or `https` URI, defaulting the port from the scheme.
    pub fn parse(uri: &str) -> Result<Self, Error> {
        let invalid = |source| Error::InvalidJwksUri {
            uri: uri.to_string(),
            source,
        };

        let url = Url::parse(uri).map_err(invalid)?;
        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            scheme => return Err(Error::UnsupportedJwksScheme(scheme.to_string())),
        };
        let host = match url.host().ok_or_else(|| invalid(url::ParseError::EmptyHost))? {
            Host::Domain(domain) => domain.to_string(),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };
        let port = url.port().unwrap_or(if tls { 443 } else { 80 });

        Ok(Self { host, port, tls })
    }

    /// Names the cluster serving this endpoint, e.g. `auth_example_com_443`.
    pub fn cluster_name(&self) -> String {
        format!("{}_{}", self.host.replace('.', "_"), self.port)
    }
}

/// Builds the cluster through which the proxy fetches keys from `endpoint`.
///
/// The hostname is resolved now, so the cluster uses static IPv4 endpoints.
pub fn jwks_cluster(endpoint: &JwksEndpoint, resolver: &impl Resolve) -> Result<Cluster, Error> {
    let addrs = resolve_ipv4(resolver, &endpoint.host)?;
    let name = endpoint.cluster_name();
    let port = u32::from(endpoint.port);
    let load_assignment = load_assignment(
        &name,
        addrs.iter().map(|ip| (ip.to_string(), port)),
    );

    let transport_socket = endpoint.tls.then(|| upstream_tls_socket(&endpoint.host));

    #[allow(deprecated)]
    let cluster = Cluster {
        name,
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Static as i32)),
        connect_timeout: Some(seconds(CONNECT_TIMEOUT_SECS)),
        lb_policy: LbPolicy::Random as i32,
        load_assignment: Some(load_assignment),
        typed_extension_protocol_options: std::iter::once((
            wellknown::HTTP_PROTOCOL_OPTIONS.to_string(),
            wellknown::to_any(types::HTTP_PROTOCOL_OPTIONS, &http2_protocol_options()),
        ))
        .collect(),
        dns_refresh_rate: Some(seconds(DNS_REFRESH_SECS)),
        respect_dns_ttl: true,
        dns_lookup_family: DnsLookupFamily::V4Only as i32,
        transport_socket,
        ..Default::default()
    };
    Ok(cluster)
}

/// Builds a cluster that balances over fixed IP endpoints.
pub fn static_cluster(name: &str, destinations: &[ir::Endpoint]) -> Cluster {
    Cluster {
        name: name.to_string(),
        cluster_discovery_type: Some(ClusterDiscoveryType::Type(DiscoveryType::Static as i32)),
        connect_timeout: Some(seconds(CONNECT_TIMEOUT_SECS)),
        lb_policy: LbPolicy::RoundRobin as i32,
        load_assignment: Some(load_assignment(
            name,
            destinations
                .iter()
                .map(|ir::Endpoint { host, port }| (host.clone(), *port)),
        )),
        ..Default::default()
    }
}

fn load_assignment(
    name: &str,
    endpoints: impl IntoIterator<Item = (String, u32)>,
) -> ClusterLoadAssignment {
    let lb_endpoints = endpoints
        .into_iter()
        .map(|(host, port)| LbEndpoint {
            host_identifier: Some(HostIdentifier::Endpoint(Endpoint {
                address: Some(socket_address(Protocol::Tcp, &host, port)),
                ..Default::default()
            })),
            ..Default::default()
        })
        .collect();

    ClusterLoadAssignment {
        cluster_name: name.to_string(),
        endpoints: vec![LocalityLbEndpoints {
            lb_endpoints,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn http2_protocol_options() -> HttpProtocolOptions {
    HttpProtocolOptions {
        upstream_protocol_options: Some(UpstreamProtocolOptions::ExplicitHttpConfig(
            ExplicitHttpConfig {
                protocol_config: Some(ProtocolConfig::Http2ProtocolOptions(
                    Http2ProtocolOptions::default(),
                )),
            },
        )),
        ..Default::default()
    }
}

fn upstream_tls_socket(sni: &str) -> TransportSocket {
    let ctx = UpstreamTlsContext {
        common_tls_context: Some(CommonTlsContext {
            validation_context_type: Some(ValidationContextType::ValidationContext(
                CertificateValidationContext {
                    trusted_ca: Some(DataSource {
                        specifier: Some(data_source::Specifier::Filename(
                            CA_BUNDLE_PATH.to_string(),
                        )),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )),
            ..Default::default()
        }),
        sni: sni.to_string(),
        ..Default::default()
    };

    TransportSocket {
        name: wellknown::TRANSPORT_SOCKET_TLS.to_string(),
        config_type: Some(transport_socket::ConfigType::TypedConfig(wellknown::to_any(
            types::UPSTREAM_TLS_CONTEXT,
            &ctx,
        ))),
    }
}
