use crate::{
    authn::{JwtProvider, RequestAuthentication},
    listener::Endpoint,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// Unique name; also names the route's upstream cluster.
    pub name: String,

    #[serde(default)]
    pub path_match: PathMatch,

    #[serde(default)]
    pub destinations: Vec<Endpoint>,

    #[serde(default)]
    pub request_authentication: Option<RequestAuthentication>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PathMatch {
    Prefix(String),
    Exact(String),
}

// === impl HttpRoute ===

impl HttpRoute {
    pub fn has_request_authentication(&self) -> bool {
        self.jwt_providers().next().is_some()
    }

    /// Iterates over the JWT providers configured on this route, in order.
    pub fn jwt_providers(&self) -> impl Iterator<Item = &JwtProvider> + '_ {
        self.request_authentication
            .iter()
            .flat_map(RequestAuthentication::jwt_providers)
    }
}

// === impl PathMatch ===

impl Default for PathMatch {
    fn default() -> Self {
        Self::Prefix("/".to_string())
    }
}

impl PathMatch {
    pub fn path(&self) -> &str {
        match self {
            Self::Prefix(path) | Self::Exact(path) => path,
        }
    }
}
