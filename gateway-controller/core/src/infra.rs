//! Managed proxy infrastructure.

use crate::validation::ValidationErrors;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROXY_NAME: &str = "default";
pub const DEFAULT_PROXY_NAMESPACE: &str = "default";
pub const DEFAULT_PROXY_IMAGE: &str = "envoyproxy/envoy-dev:latest";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Infra {
    #[serde(default)]
    pub provider: Provider,

    #[serde(default)]
    pub proxy: Option<ProxyInfra>,
}

/// Where managed infrastructure runs. Kubernetes is the only supported provider.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provider {
    #[default]
    Kubernetes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyInfra {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub image: String,
}

// === impl Infra ===

impl Infra {
    pub fn new() -> Self {
        Self {
            provider: Provider::Kubernetes,
            proxy: Some(ProxyInfra::default()),
        }
    }

    /// Returns the proxy configuration, filling unset fields with defaults.
    pub fn proxy_infra(&self) -> ProxyInfra {
        let Some(proxy) = &self.proxy else {
            return ProxyInfra::default();
        };

        let or_default = |value: &str, default: &str| {
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };
        ProxyInfra {
            name: or_default(&proxy.name, DEFAULT_PROXY_NAME),
            namespace: or_default(&proxy.namespace, DEFAULT_PROXY_NAMESPACE),
            image: or_default(&proxy.image, DEFAULT_PROXY_IMAGE),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        match &self.proxy {
            Some(proxy) => proxy.validate(),
            None => Ok(()),
        }
    }
}

// === impl ProxyInfra ===

impl Default for ProxyInfra {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROXY_NAME.to_string(),
            namespace: DEFAULT_PROXY_NAMESPACE.to_string(),
            image: DEFAULT_PROXY_IMAGE.to_string(),
        }
    }
}

impl ProxyInfra {
    /// The name given to every object created for this proxy.
    pub fn object_name(&self) -> String {
        let name = if self.name.is_empty() {
            DEFAULT_PROXY_NAME
        } else {
            &self.name
        };
        format!("envoy-{name}")
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        errors.require("proxy", "name", self.name.is_empty());
        errors.require("proxy", "namespace", self.namespace.is_empty());
        errors.require("proxy", "image", self.image.is_empty());
        errors.into_result()
    }
}
