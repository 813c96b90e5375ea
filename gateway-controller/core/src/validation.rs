use crate::{
    Endpoint, HttpListener, HttpRoute, JwtProvider, TcpListener, UdpListener, Xds,
};
use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    fmt,
    net::IpAddr,
};

/// A single problem found while validating IR.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{object}: {field} field required")]
    MissingField { object: String, field: &'static str },

    #[error("{object}: address {address:?} is not an IP address")]
    InvalidAddress { object: String, address: String },

    #[error("{object}: invalid port {port}")]
    InvalidPort { object: String, port: u32 },

    #[error("{object}: at least one destination required")]
    NoDestinations { object: String },

    #[error("{object}: name is not unique")]
    DuplicateName { object: String },

    /// Routes, TCP listeners and UDP listeners each name the cluster they forward to.
    #[error("{object}: cluster name {name:?} is already used by {owner}")]
    DuplicateClusterName {
        object: String,
        name: String,
        owner: String,
    },
}

/// Every problem found in one validation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationError>);

// === impl ValidationErrors ===

impl ValidationErrors {
    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> + '_ {
        self.0.iter()
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub(crate) fn require(&mut self, object: &str, field: &'static str, missing: bool) {
        if missing {
            self.push(ValidationError::MissingField {
                object: object.to_string(),
                field,
            });
        }
    }

    fn address(&mut self, object: &str, address: &str) {
        if address.is_empty() {
            self.require(object, "address", true);
        } else if address.parse::<IpAddr>().is_err() {
            self.push(ValidationError::InvalidAddress {
                object: object.to_string(),
                address: address.to_string(),
            });
        }
    }

    fn port(&mut self, object: &str, port: u32) {
        if port == 0 || port > u32::from(u16::MAX) {
            self.push(ValidationError::InvalidPort {
                object: object.to_string(),
                port,
            });
        }
    }

    /// Claims `name` in the cluster namespace shared by all listeners.
    fn cluster<'a>(
        &mut self,
        clusters: &mut HashMap<&'a str, String>,
        name: &'a str,
        object: String,
    ) {
        if name.is_empty() {
            return;
        }
        match clusters.entry(name) {
            Entry::Vacant(entry) => {
                entry.insert(object);
            }
            Entry::Occupied(entry) => self.push(ValidationError::DuplicateClusterName {
                object,
                name: name.to_string(),
                owner: entry.get().clone(),
            }),
        }
    }

    fn destinations(&mut self, object: &str, destinations: &[Endpoint]) {
        if destinations.is_empty() {
            self.push(ValidationError::NoDestinations {
                object: object.to_string(),
            });
        }
        for (i, Endpoint { host, port }) in destinations.iter().enumerate() {
            let object = format!("{object} destination {i}");
            self.address(&object, host);
            self.port(&object, *port);
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [error] = self.0.as_slice() {
            return error.fmt(f);
        }

        write!(f, "[")?;
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            error.fmt(f)?;
        }
        write!(f, "]")
    }
}

impl std::error::Error for ValidationErrors {}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// === impl Xds ===

impl Xds {
    /// Checks that every listener, route and provider has its required fields populated,
    /// reporting all problems at once.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let mut names = HashSet::new();
        let mut clusters = HashMap::new();
        for listener in &self.http {
            let object = format!("http listener {:?}", listener.name);
            if !listener.name.is_empty() && !names.insert(listener.name.as_str()) {
                errors.push(ValidationError::DuplicateName { object: object.clone() });
            }
            errors.extend(validate_http_listener(&object, listener));
            for route in &listener.routes {
                let object = format!("{object} route {:?}", route.name);
                errors.cluster(&mut clusters, &route.name, object);
            }
        }
        for listener in &self.tcp {
            let object = format!("tcp listener {:?}", listener.name);
            if !listener.name.is_empty() && !names.insert(listener.name.as_str()) {
                errors.push(ValidationError::DuplicateName { object: object.clone() });
            }
            errors.extend(validate_tcp_listener(&object, listener));
            errors.cluster(&mut clusters, &listener.name, object);
        }
        for listener in &self.udp {
            let object = format!("udp listener {:?}", listener.name);
            if !listener.name.is_empty() && !names.insert(listener.name.as_str()) {
                errors.push(ValidationError::DuplicateName { object: object.clone() });
            }
            errors.extend(validate_udp_listener(&object, listener));
            errors.cluster(&mut clusters, &listener.name, object);
        }

        errors.into_result()
    }
}

fn validate_http_listener(object: &str, listener: &HttpListener) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    errors.require(object, "name", listener.name.is_empty());
    errors.address(object, &listener.address);
    errors.port(object, listener.port);
    errors.require(object, "hostnames", listener.hostnames.is_empty());

    if let Some(tls) = &listener.tls {
        errors.require(object, "tls.serverCertificate", tls.server_certificate.is_empty());
        errors.require(object, "tls.privateKey", tls.private_key.is_empty());
    }

    for route in &listener.routes {
        let route_object = format!("{object} route {:?}", route.name);
        errors.extend(validate_route(&route_object, route));
    }

    errors
}

fn validate_route(object: &str, route: &HttpRoute) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    errors.require(object, "name", route.name.is_empty());
    errors.require(object, "pathMatch", route.path_match.path().is_empty());
    errors.destinations(object, &route.destinations);

    for provider in route.jwt_providers() {
        let object = format!("{object} jwt provider {:?}", provider.name);
        errors.extend(validate_jwt_provider(&object, provider));
    }

    errors
}

fn validate_jwt_provider(object: &str, provider: &JwtProvider) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    errors.require(object, "name", provider.name.is_empty());
    errors.require(object, "remoteJwks.uri", provider.remote_jwks.uri.is_empty());
    errors
}

fn validate_tcp_listener(object: &str, listener: &TcpListener) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    errors.require(object, "name", listener.name.is_empty());
    errors.address(object, &listener.address);
    errors.port(object, listener.port);
    if let Some(tls) = &listener.tls {
        errors.require(object, "tls.snis", tls.snis.is_empty());
    }
    errors.destinations(object, &listener.destinations);
    errors
}

fn validate_udp_listener(object: &str, listener: &UdpListener) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    errors.require(object, "name", listener.name.is_empty());
    errors.address(object, &listener.address);
    errors.port(object, listener.port);
    errors.destinations(object, &listener.destinations);
    errors
}
