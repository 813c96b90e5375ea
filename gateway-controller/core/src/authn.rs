use serde::{Deserialize, Serialize};

/// Authentication required of requests matching a route.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAuthentication {
    /// A request is authenticated when any one of these providers validates it.
    #[serde(default)]
    pub providers: Vec<AuthProvider>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AuthProvider {
    Jwt(JwtProvider),
}

/// Validates JSON Web Tokens issued by `issuer`, with keys fetched from a remote JWKS.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtProvider {
    pub name: String,

    #[serde(default)]
    pub issuer: String,

    #[serde(default)]
    pub audiences: Vec<String>,

    pub remote_jwks: RemoteJwks,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJwks {
    pub uri: String,
}

// === impl RequestAuthentication ===

impl RequestAuthentication {
    pub fn jwt_providers(&self) -> impl Iterator<Item = &JwtProvider> + '_ {
        self.providers.iter().map(|provider| match provider {
            AuthProvider::Jwt(jwt) => jwt,
        })
    }
}

// === impl JwtProvider ===

impl JwtProvider {
    /// Returns true if both providers validate tokens identically, regardless of name.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        let Self {
            name: _,
            issuer,
            audiences,
            remote_jwks,
        } = self;
        *issuer == other.issuer && *audiences == other.audiences && *remote_jwks == other.remote_jwks
    }
}
