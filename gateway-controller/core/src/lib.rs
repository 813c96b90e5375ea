//! The intermediate representation shared by the resource translator and the xDS translator.
//!
//! An [`Xds`] tree is built once per translation pass and is only read while proxy
//! configuration is assembled from it. It must pass [`Xds::validate`] before translation.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod authn;
pub mod infra;
mod listener;
mod route;
mod validation;

pub use self::{
    authn::{AuthProvider, JwtProvider, RemoteJwks, RequestAuthentication},
    listener::{
        Endpoint, HttpListener, TcpListener, TlsInspectorConfig, TlsListenerConfig, UdpListener,
    },
    route::{HttpRoute, PathMatch},
    validation::{ValidationError, ValidationErrors},
};
use serde::{Deserialize, Serialize};

/// Listener configuration for a single managed proxy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Xds {
    #[serde(default)]
    pub http: Vec<HttpListener>,

    #[serde(default)]
    pub tcp: Vec<TcpListener>,

    #[serde(default)]
    pub udp: Vec<UdpListener>,
}
