use anyhow::{Context, Result};
use gateway_controller_jwks::{Client, Config, Metrics, PublicKeyUse, RemoteSource};
use prometheus_client::registry::Registry;
use std::str::FromStr;
use tracing::{debug, info};
use url::Url;

/// The use a resolved key must declare.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum KeyUse {
    Signature,
    Encryption,
}

// === impl KeyUse ===

impl FromStr for KeyUse {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sig" => Ok(Self::Signature),
            "enc" => Ok(Self::Encryption),
            _ => anyhow::bail!("invalid key use {s:?}: expected 'sig' or 'enc'"),
        }
    }
}

impl From<KeyUse> for PublicKeyUse {
    fn from(key_use: KeyUse) -> Self {
        match key_use {
            KeyUse::Signature => PublicKeyUse::Signature,
            KeyUse::Encryption => PublicKeyUse::Encryption,
        }
    }
}

pub(crate) async fn run(
    uri: Url,
    kid: String,
    key_use: Option<KeyUse>,
    config: Config,
) -> Result<()> {
    let mut prom = <Registry>::default();
    let metrics = Metrics::register(prom.sub_registry_with_prefix("jwks"));

    let source = RemoteSource::new(uri.clone())?;
    let client = Client::new(source, config, metrics).context("invalid JWKS client config")?;

    let key_use = key_use.map(PublicKeyUse::from);
    let jwk = client
        .get_key(&kid, key_use.as_ref())
        .await
        .with_context(|| format!("failed to resolve key from {uri}"))?;
    info!(
        %kid,
        algorithm = ?jwk.common.key_algorithm,
        key_use = ?jwk.common.public_key_use,
        "Resolved key",
    );

    let mut metrics = String::new();
    prometheus_client::encoding::text::encode(&mut metrics, &prom)?;
    debug!(%metrics);
    Ok(())
}
