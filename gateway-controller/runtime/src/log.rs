use std::str::FromStr;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Log directives, validated when arguments are parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFilter(String);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid log format {0:?}: expected 'plain' or 'json'")]
pub struct InvalidLogFormat(String);

// === impl LogFilter ===

impl FromStr for LogFilter {
    type Err = tracing_subscriber::filter::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnvFilter::try_new(s)?;
        Ok(Self(s.to_string()))
    }
}

impl LogFilter {
    fn env_filter(&self) -> EnvFilter {
        // Validated in `from_str`.
        EnvFilter::try_new(&self.0).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

// === impl LogFormat ===

impl FromStr for LogFormat {
    type Err = InvalidLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            _ => Err(InvalidLogFormat(s.to_string())),
        }
    }
}

impl LogFormat {
    /// Installs the global subscriber.
    pub fn try_init(self, filter: &LogFilter) -> anyhow::Result<()> {
        let registry = tracing_subscriber::registry().with(filter.env_filter());
        match self {
            Self::Plain => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
            Self::Json => registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?,
        }
        Ok(())
    }
}
