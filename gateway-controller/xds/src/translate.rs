use crate::{
    authn::{build_jwt_authn, JwtAuthn, JwtScope},
    cluster::static_cluster,
    listener::{
        add_http_filter_chain, add_tcp_filter_chain, downstream_tls_secret, tcp_listener,
        udp_listener,
    },
    resolve::{Resolve, SystemResolver},
    route::route_configuration,
    wellknown::{to_any, types},
    Error,
};
use envoy_types::pb::{
    envoy::{
        config::{
            cluster::v3::Cluster,
            core::v3::{address::Address as AddressKind, socket_address::Protocol},
            listener::v3::Listener,
            route::v3::RouteConfiguration,
        },
        extensions::transport_sockets::tls::v3::Secret,
    },
    google::protobuf::Any,
};
use gateway_controller_core as ir;
use std::collections::HashSet;

/// Compiles IR into xDS resources.
#[derive(Clone, Debug, Default)]
pub struct Translator<R = SystemResolver> {
    resolver: R,
    jwt_scope: JwtScope,
}

/// The complete output of one translation pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceSet {
    pub listeners: Vec<Listener>,
    pub routes: Vec<RouteConfiguration>,
    pub clusters: Vec<Cluster>,
    pub secrets: Vec<Secret>,

    /// Names of clusters that serve JWKS endpoints. These may be shared by listeners.
    jwks_clusters: HashSet<String>,
}

// === impl Translator ===

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R> Translator<R> {
    pub fn with_resolver<S: Resolve>(self, resolver: S) -> Translator<S> {
        Translator {
            resolver,
            jwt_scope: self.jwt_scope,
        }
    }

    pub fn with_jwt_scope(self, jwt_scope: JwtScope) -> Self {
        Self { jwt_scope, ..self }
    }
}

impl<R: Resolve> Translator<R> {
    /// Builds every resource described by `xds`.
    ///
    /// The IR is validated first. On error, nothing is returned; the caller's previous
    /// resources remain in effect.
    pub fn translate(&self, xds: &ir::Xds) -> Result<ResourceSet, Error> {
        xds.validate()?;

        let mut resources = ResourceSet::default();
        for listener in &xds.http {
            self.translate_http(&mut resources, listener)?;
        }
        for listener in &xds.tcp {
            translate_tcp(&mut resources, listener)?;
        }
        for listener in &xds.udp {
            translate_udp(&mut resources, listener)?;
        }

        tracing::debug!(
            listeners = resources.listeners.len(),
            routes = resources.routes.len(),
            clusters = resources.clusters.len(),
            secrets = resources.secrets.len(),
            "Translated",
        );
        Ok(resources)
    }

    fn translate_http(
        &self,
        resources: &mut ResourceSet,
        listener: &ir::HttpListener,
    ) -> Result<(), Error> {
        let jwt = if listener.has_request_authentication() {
            Some(build_jwt_authn(listener, self.jwt_scope, &self.resolver)?)
        } else {
            None
        };

        let xds = resources.tcp_listener_mut(&listener.name, &listener.address, listener.port);
        add_http_filter_chain(xds, listener, jwt.as_ref().map(JwtAuthn::http_filter))?;

        if let Some(tls) = &listener.tls {
            resources
                .secrets
                .push(downstream_tls_secret(&listener.name, tls));
        }
        resources.routes.push(route_configuration(listener));
        for route in &listener.routes {
            resources.add_cluster(static_cluster(&route.name, &route.destinations))?;
        }
        for cluster in jwt.into_iter().flat_map(|jwt| jwt.clusters) {
            resources.add_jwks_cluster(cluster)?;
        }

        tracing::trace!(listener = %listener.name, "Translated HTTP listener");
        Ok(())
    }
}

fn translate_tcp(resources: &mut ResourceSet, listener: &ir::TcpListener) -> Result<(), Error> {
    let xds = resources.tcp_listener_mut(&listener.name, &listener.address, listener.port);
    add_tcp_filter_chain(xds, listener, &listener.name)?;
    resources.add_cluster(static_cluster(&listener.name, &listener.destinations))?;
    tracing::trace!(listener = %listener.name, "Translated TCP listener");
    Ok(())
}

fn translate_udp(resources: &mut ResourceSet, listener: &ir::UdpListener) -> Result<(), Error> {
    resources
        .listeners
        .push(udp_listener(listener, &listener.name));
    resources.add_cluster(static_cluster(&listener.name, &listener.destinations))?;
    tracing::trace!(listener = %listener.name, "Translated UDP listener");
    Ok(())
}

// === impl ResourceSet ===

impl ResourceSet {
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
            && self.routes.is_empty()
            && self.clusters.is_empty()
            && self.secrets.is_empty()
    }

    /// Returns the listener bound to `address:port` over `protocol`.
    pub fn listener(&self, protocol: Protocol, address: &str, port: u32) -> Option<&Listener> {
        self.listeners
            .iter()
            .find(|l| is_bound_to(l, protocol, address, port))
    }

    /// Adds a cluster owned by a single route or listener. Fails if the name is taken.
    pub fn add_cluster(&mut self, cluster: Cluster) -> Result<(), Error> {
        if self.clusters.iter().any(|c| c.name == cluster.name) {
            return Err(Error::DuplicateCluster(cluster.name));
        }
        self.clusters.push(cluster);
        Ok(())
    }

    /// Adds a JWKS cluster unless an identically named JWKS cluster exists. Fails if the
    /// name is taken by any other cluster.
    pub fn add_jwks_cluster(&mut self, cluster: Cluster) -> Result<(), Error> {
        if self.jwks_clusters.contains(&cluster.name) {
            return Ok(());
        }
        self.add_cluster(cluster.clone())?;
        self.jwks_clusters.insert(cluster.name);
        Ok(())
    }

    /// Encodes every resource for distribution, keyed by name.
    pub fn typed_resources(&self) -> Vec<(String, Any)> {
        let listeners = self
            .listeners
            .iter()
            .map(|l| (l.name.clone(), to_any(types::LISTENER, l)));
        let routes = self
            .routes
            .iter()
            .map(|r| (r.name.clone(), to_any(types::ROUTE_CONFIGURATION, r)));
        let clusters = self
            .clusters
            .iter()
            .map(|c| (c.name.clone(), to_any(types::CLUSTER, c)));
        let secrets = self
            .secrets
            .iter()
            .map(|s| (s.name.clone(), to_any(types::SECRET, s)));
        listeners.chain(routes).chain(clusters).chain(secrets).collect()
    }

    /// Returns the TCP listener bound to `address:port`, creating it with `name` if needed.
    /// IR listeners that share an address share a listener.
    fn tcp_listener_mut(&mut self, name: &str, address: &str, port: u32) -> &mut Listener {
        let idx = match self
            .listeners
            .iter()
            .position(|l| is_bound_to(l, Protocol::Tcp, address, port))
        {
            Some(idx) => idx,
            None => {
                self.listeners.push(tcp_listener(name, address, port));
                self.listeners.len() - 1
            }
        };
        &mut self.listeners[idx]
    }
}

fn is_bound_to(listener: &Listener, protocol: Protocol, address: &str, port: u32) -> bool {
    use envoy_types::pb::envoy::config::core::v3::socket_address::PortSpecifier;

    let Some(AddressKind::SocketAddress(sa)) =
        listener.address.as_ref().and_then(|a| a.address.as_ref())
    else {
        return false;
    };
    sa.protocol == protocol as i32
        && sa.address == address
        && sa.port_specifier == Some(PortSpecifier::PortValue(port))
}
