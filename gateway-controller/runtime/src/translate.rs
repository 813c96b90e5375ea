use anyhow::{Context, Result};
use gateway_controller_core::{infra::Infra, Xds};
use gateway_controller_xds::{JwtScope, Resolve, ResourceSet, Translator};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// The input to a single translation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Document {
    #[serde(default)]
    pub infra: Option<Infra>,

    #[serde(default)]
    pub xds: Xds,
}

pub(crate) async fn run(path: PathBuf, jwt_scope: JwtScope) -> Result<()> {
    let bytes =
        std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let document = load(&bytes).with_context(|| format!("invalid IR in {}", path.display()))?;

    // Hostname resolution blocks.
    let translator = Translator::new().with_jwt_scope(jwt_scope);
    let resources = tokio::task::spawn_blocking(move || translate(&translator, &document))
        .await
        .context("translation task failed")??;

    for (name, resource) in resources.typed_resources() {
        debug!(%name, type_url = %resource.type_url, bytes = resource.value.len(), "Resource");
    }
    Ok(())
}

pub(crate) fn load(bytes: &[u8]) -> Result<Document> {
    let document = serde_json::from_slice::<Document>(bytes)?;
    if let Some(infra) = &document.infra {
        infra.validate()?;
    }
    Ok(document)
}

pub(crate) fn translate<R: Resolve>(
    translator: &Translator<R>,
    document: &Document,
) -> Result<ResourceSet> {
    if let Some(infra) = &document.infra {
        let proxy = infra.proxy_infra();
        info!(
            name = %proxy.object_name(),
            namespace = %proxy.namespace,
            image = %proxy.image,
            "Translating for proxy",
        );
    }

    let resources = translator.translate(&document.xds)?;
    info!(
        listeners = resources.listeners.len(),
        routes = resources.routes.len(),
        clusters = resources.clusters.len(),
        secrets = resources.secrets.len(),
        "Translated IR",
    );
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io, net::IpAddr};

    /// Fails every lookup so that only IP literals resolve.
    struct NoDns;

    impl Resolve for NoDns {
        fn lookup_ip(&self, host: &str) -> io::Result<Vec<IpAddr>> {
            Err(io::Error::new(io::ErrorKind::NotFound, host.to_string()))
        }
    }

    const DOCUMENT: &str = r#"{
        "infra": {
            "proxy": {
                "name": "eg",
                "namespace": "envoy-gateway-system",
                "image": "envoyproxy/envoy:v1.23"
            }
        },
        "xds": {
            "http": [{
                "name": "default/eg/http",
                "address": "0.0.0.0",
                "port": 10080,
                "hostnames": ["*"],
                "routes": [{
                    "name": "default/backend",
                    "pathMatch": { "prefix": "/" },
                    "destinations": [{ "host": "10.0.0.1", "port": 8080 }],
                    "requestAuthentication": {
                        "providers": [{
                            "type": "jwt",
                            "name": "example",
                            "issuer": "https://auth.example.com",
                            "audiences": ["api.example.com"],
                            "remoteJwks": { "uri": "https://192.0.2.10/jwks.json" }
                        }]
                    }
                }]
            }],
            "udp": [{
                "name": "default/eg/udp",
                "address": "0.0.0.0",
                "port": 5300,
                "destinations": [{ "host": "10.0.0.2", "port": 53 }]
            }]
        }
    }"#;

    #[test]
    fn loads_and_translates_documents() {
        let document = load(DOCUMENT.as_bytes()).expect("must load");
        assert_eq!(
            document
                .infra
                .as_ref()
                .map(|infra| infra.proxy_infra().object_name()),
            Some("envoy-eg".to_string())
        );
        assert_eq!(document.xds.http.len(), 1);
        assert_eq!(document.xds.udp.len(), 1);

        let translator = Translator::new().with_resolver(NoDns);
        let resources = translate(&translator, &document).expect("must translate");
        assert_eq!(resources.listeners.len(), 2);
        assert_eq!(resources.routes.len(), 1);
        assert_eq!(
            resources
                .clusters
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>(),
            vec!["default/backend", "192_0_2_10_443", "default/eg/udp"]
        );
    }

    #[test]
    fn xds_defaults_to_empty() {
        let document = load(b"{}").expect("must load");
        assert_eq!(document, Document::default());

        let resources =
            translate(&Translator::new().with_resolver(NoDns), &document).expect("must translate");
        assert!(resources.is_empty());
    }

    #[test]
    fn rejects_invalid_infra() {
        let document = br#"{ "infra": { "proxy": { "name": "eg", "namespace": "default", "image": "" } } }"#;
        let error = load(document).expect_err("must fail");
        assert!(error.to_string().contains("image"), "{error}");
    }
}
