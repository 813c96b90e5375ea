use crate::route::HttpRoute;
use serde::{Deserialize, Serialize};

/// An HTTP (or HTTPS, when `tls` is set) listener and the routes it serves.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpListener {
    /// Unique name; also names the listener's route configuration and TLS secret.
    pub name: String,
    pub address: String,
    pub port: u32,

    /// Hostnames served by this listener. Used for SNI matching when TLS is terminated.
    #[serde(default)]
    pub hostnames: Vec<String>,

    #[serde(default)]
    pub tls: Option<TlsListenerConfig>,

    #[serde(default)]
    pub routes: Vec<HttpRoute>,
}

/// Certificate material for terminating TLS on a listener.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsListenerConfig {
    /// PEM-encoded certificate chain.
    pub server_certificate: Vec<u8>,

    /// PEM-encoded private key.
    pub private_key: Vec<u8>,
}

/// A listener that proxies TCP connections to a set of destinations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TcpListener {
    pub name: String,
    pub address: String,
    pub port: u32,

    /// Set when connections are TLS passthrough and should be matched on SNI.
    #[serde(default)]
    pub tls: Option<TlsInspectorConfig>,

    #[serde(default)]
    pub destinations: Vec<Endpoint>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsInspectorConfig {
    #[serde(default)]
    pub snis: Vec<String>,
}

/// A listener that proxies UDP datagrams to a set of destinations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UdpListener {
    pub name: String,
    pub address: String,
    pub port: u32,

    #[serde(default)]
    pub destinations: Vec<Endpoint>,
}

/// A backend IP address and port.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u32,
}

// === impl HttpListener ===

impl HttpListener {
    /// Returns true if any route on this listener requires request authentication.
    pub fn has_request_authentication(&self) -> bool {
        self.routes.iter().any(HttpRoute::has_request_authentication)
    }
}

// === impl TlsListenerConfig ===

// Key material is never printed.
impl std::fmt::Debug for TlsListenerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsListenerConfig")
            .field("server_certificate", &self.server_certificate.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}
