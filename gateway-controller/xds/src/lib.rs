//! Compiles the gateway IR into Envoy listener, route, cluster, and secret resources.
//!
//! A translation pass is all-or-nothing: [`Translator::translate`] validates the IR, builds
//! every resource into a fresh [`ResourceSet`], and returns it only when the whole pass
//! succeeds.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod authn;
pub mod cluster;
pub mod listener;
pub mod resolve;
pub mod route;
mod translate;
pub mod wellknown;

#[cfg(test)]
mod tests;

pub use self::{
    authn::JwtScope,
    resolve::{Resolve, SystemResolver},
    translate::{ResourceSet, Translator},
};
use gateway_controller_core::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid IR: {0}")]
    Invalid(#[from] ValidationErrors),

    #[error("listener {0} has no routes with JWT providers")]
    NoJwtProviders(String),

    #[error("invalid JWKS URI {uri:?}: {source}")]
    InvalidJwksUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported JWKS URI scheme {0}")]
    UnsupportedJwksScheme(String),

    #[error("failed to resolve hostname {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("hostname {0} does not resolve to an IPv4 address")]
    NoIpv4Address(String),

    #[error("listener {0} already has a default filter chain")]
    DuplicateDefaultFilterChain(String),

    #[error("listener {listener} has conflicting JWT providers named {provider}")]
    ConflictingJwtProvider { listener: String, provider: String },

    #[error("cluster {0} is defined more than once")]
    DuplicateCluster(String),
}
