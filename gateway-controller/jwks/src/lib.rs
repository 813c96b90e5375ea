//! Resolves JSON Web Keys by key ID from a remote JWKS endpoint.
//!
//! The [`Client`] serves keys from a local cache with bounded staleness: once a key's soft
//! refresh deadline passes it is still returned immediately, while a single background task
//! re-fetches the key set. Keys that are not cached at all are fetched synchronously.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod client;
mod metrics;
mod source;

#[cfg(test)]
mod tests;

pub use self::{
    client::{
        Client, Config, ConfigError, Error, CACHE_CLEANUP_INTERVAL, DEFAULT_REFRESH,
        PUB_KEY_EXPIRATION,
    },
    metrics::Metrics,
    source::{RemoteSource, Source, SourceError, DEFAULT_TIMEOUT},
};
pub use jsonwebtoken::jwk::{Jwk, JwkSet, PublicKeyUse};
