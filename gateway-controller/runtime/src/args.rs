use crate::{
    duration::GoDuration,
    log::{LogFilter, LogFormat},
    lookup::{self, KeyUse},
    translate,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use gateway_controller_xds::JwtScope;
use std::{path::PathBuf, str::FromStr};
use url::Url;

#[derive(Debug, Parser)]
#[clap(name = "gateway", about = "An Envoy gateway control plane")]
pub struct Args {
    #[clap(
        long,
        default_value = "gateway=info,warn",
        env = "GATEWAY_CONTROLLER_LOG"
    )]
    log_level: LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: LogFormat,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Translates an IR document into proxy configuration.
    Translate(TranslateArgs),

    /// Resolves a verification key from a remote JWKS endpoint.
    Jwks(JwksArgs),
}

#[derive(Debug, clap::Args)]
struct TranslateArgs {
    /// Path to a JSON IR document.
    #[clap(long)]
    ir: PathBuf,

    /// Whether JWT requirements apply to whole listeners or to individual routes.
    #[clap(long, default_value = "listener")]
    jwt_scope: Scope,
}

#[derive(Debug, clap::Args)]
struct JwksArgs {
    #[clap(long)]
    uri: Url,

    #[clap(long)]
    kid: String,

    /// Only accept keys declaring this use (`sig` or `enc`).
    #[clap(long = "use")]
    key_use: Option<KeyUse>,

    /// How long a fetched key is served before it is refreshed in the background.
    #[clap(long, default_value = "5m")]
    refresh: GoDuration,

    /// How long a fetched key may be served at all.
    #[clap(long, default_value = "12h")]
    ttl: GoDuration,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Scope(JwtScope);

// === impl Args ===

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            command,
        } = self;

        log_format.try_init(&log_level)?;

        match command {
            Command::Translate(TranslateArgs {
                ir,
                jwt_scope: Scope(jwt_scope),
            }) => translate::run(ir, jwt_scope).await,

            Command::Jwks(JwksArgs {
                uri,
                kid,
                key_use,
                refresh,
                ttl,
            }) => {
                let config = crate::jwks::Config {
                    refresh: refresh.into(),
                    ttl: ttl.into(),
                    ..Default::default()
                };
                lookup::run(uri, kid, key_use, config).await
            }
        }
    }
}

// === impl Scope ===

impl FromStr for Scope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "listener" => Ok(Self(JwtScope::Listener)),
            "route" => Ok(Self(JwtScope::Route)),
            _ => anyhow::bail!("invalid JWT scope {s:?}: expected 'listener' or 'route'"),
        }
    }
}
