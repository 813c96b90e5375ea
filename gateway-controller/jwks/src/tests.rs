use super::*;
use crate::metrics::Lookup;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use tokio::time::{self, Duration};

/// A source that serves a configurable key set after a fixed delay.
#[derive(Clone)]
struct TestSource(Arc<TestSourceState>);

struct TestSourceState {
    fetches: AtomicUsize,
    stalled: AtomicBool,
    delay: Duration,
    response: Mutex<Result<serde_json::Value, StatusCode>>,
}

impl TestSource {
    fn new(keys: serde_json::Value, delay: Duration) -> Self {
        Self(Arc::new(TestSourceState {
            fetches: AtomicUsize::new(0),
            stalled: AtomicBool::new(false),
            delay,
            response: Mutex::new(Ok(keys)),
        }))
    }

    fn fetches(&self) -> usize {
        self.0.fetches.load(Ordering::SeqCst)
    }

    fn set_keys(&self, keys: serde_json::Value) {
        self.0.stalled.store(false, Ordering::SeqCst);
        *self.0.response.lock() = Ok(keys);
    }

    /// Subsequent fetches never complete.
    fn stall(&self) {
        self.0.stalled.store(true, Ordering::SeqCst);
    }

    fn fail(&self, status: StatusCode) {
        *self.0.response.lock() = Err(status);
    }
}

#[async_trait::async_trait]
impl Source for TestSource {
    async fn get_jwks(&self) -> Result<JwkSet, SourceError> {
        self.0.fetches.fetch_add(1, Ordering::SeqCst);
        if self.0.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        time::sleep(self.0.delay).await;
        let response = self.0.response.lock().clone();
        match response {
            Ok(keys) => Ok(serde_json::from_value(keys)?),
            Err(status) => Err(SourceError::Status(status)),
        }
    }
}

fn key(kid: &str, key_use: &str, n: &str) -> serde_json::Value {
    serde_json::json!({
        "kty": "RSA",
        "kid": kid,
        "use": key_use,
        "n": n,
        "e": "AQAB",
    })
}

fn key_set(keys: Vec<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({ "keys": keys })
}

const REFRESH: Duration = Duration::from_secs(5 * 60);
const TTL: Duration = Duration::from_secs(60 * 60);
const FETCH_DELAY: Duration = Duration::from_millis(100);

fn client(source: &TestSource) -> (Client<TestSource>, Metrics) {
    let metrics = Metrics::default();
    let config = Config {
        refresh: REFRESH,
        ttl: TTL,
        cleanup_interval: Duration::ZERO,
    };
    let client = Client::new(source.clone(), config, metrics.clone()).expect("config must be valid");
    (client, metrics)
}

fn modulus(jwk: &Jwk) -> &str {
    match &jwk.algorithm {
        jsonwebtoken::jwk::AlgorithmParameters::RSA(rsa) => &rsa.n,
        alg => panic!("unexpected key type: {alg:?}"),
    }
}

#[test]
fn rejects_refresh_not_less_than_ttl() {
    let config = Config {
        refresh: TTL,
        ttl: TTL,
        cleanup_interval: Duration::ZERO,
    };
    assert_eq!(
        config.validate(),
        Err(ConfigError::RefreshExceedsTtl {
            refresh: TTL,
            ttl: TTL
        })
    );

    let config = Config {
        refresh: TTL + Duration::from_secs(1),
        ..config
    };
    assert!(config.validate().is_err());

    assert_eq!(Config::default().validate(), Ok(()));
}

#[tokio::test(start_paused = true)]
async fn rejects_invalid_config_at_construction() {
    let source = TestSource::new(key_set(vec![]), FETCH_DELAY);
    let config = Config {
        refresh: TTL,
        ttl: TTL,
        cleanup_interval: Duration::ZERO,
    };
    assert!(Client::new(source, config, Metrics::default()).is_err());
}

#[tokio::test(start_paused = true)]
async fn miss_then_hit() {
    let _tracing = trace_init();
    let source = TestSource::new(key_set(vec![key("k1", "sig", "one")]), FETCH_DELAY);
    let (client, metrics) = client(&source);

    let jwk = client.get_key("k1", None).await.expect("key must resolve");
    assert_eq!(jwk.common.key_id.as_deref(), Some("k1"));
    assert_eq!(source.fetches(), 1);

    time::advance(REFRESH - Duration::from_secs(1)).await;
    let jwk = client.get_key("k1", None).await.expect("key must resolve");
    assert_eq!(modulus(&jwk), "one");
    assert_eq!(source.fetches(), 1, "cached keys must not be fetched");

    assert_eq!(metrics.lookups(Lookup::Miss), 1);
    assert_eq!(metrics.lookups(Lookup::Hit), 1);
    assert_eq!(metrics.refreshes(true), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_key_is_not_found() {
    let _tracing = trace_init();
    let source = TestSource::new(key_set(vec![key("k1", "sig", "one")]), FETCH_DELAY);
    let (client, _) = client(&source);

    let error = client.get_key("k2", None).await.expect_err("key must not resolve");
    assert!(
        matches!(&error, Error::KeyNotFound { kid, key_use: None } if kid == "k2"),
        "{error:?}"
    );
    assert_eq!(error.to_string(), "JWK k2 not found (use: any)");
    assert_eq!(source.fetches(), 1, "the full key set is fetched");
}

#[tokio::test(start_paused = true)]
async fn key_use_must_match() {
    let _tracing = trace_init();
    let source = TestSource::new(key_set(vec![key("k1", "enc", "one")]), FETCH_DELAY);
    let (client, _) = client(&source);

    let error = client
        .get_key("k1", Some(&PublicKeyUse::Signature))
        .await
        .expect_err("key must not resolve");
    assert_eq!(error.to_string(), "JWK k1 not found (use: sig)");

    let jwk = client
        .get_key("k1", Some(&PublicKeyUse::Encryption))
        .await
        .expect("key must resolve");
    assert_eq!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption));
}

#[tokio::test(start_paused = true)]
async fn source_errors_propagate_on_miss() {
    let _tracing = trace_init();
    let source = TestSource::new(key_set(vec![]), FETCH_DELAY);
    source.fail(StatusCode::INTERNAL_SERVER_ERROR);
    let (client, metrics) = client(&source);

    let error = client.get_key("k1", None).await.expect_err("key must not resolve");
    assert!(
        matches!(error, Error::Source(SourceError::Status(status)) if status == StatusCode::INTERNAL_SERVER_ERROR),
        "{error:?}"
    );
    assert_eq!(metrics.refreshes(false), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_key_is_served_while_refreshing() {
    let _tracing = trace_init();
    let source = TestSource::new(key_set(vec![key("k1", "sig", "one")]), FETCH_DELAY);
    let (client, metrics) = client(&source);
    client.get_key("k1", None).await.expect("key must resolve");

    source.set_keys(key_set(vec![key("k1", "sig", "two")]));
    time::advance(REFRESH + Duration::from_secs(1)).await;

    // The stale key is returned without waiting on the fetch.
    let jwk = client.get_key("k1", None).await.expect("key must resolve");
    assert_eq!(modulus(&jwk), "one");
    assert_eq!(metrics.lookups(Lookup::Stale), 1);

    // Once the background refresh completes, the new key is served as a hit.
    time::sleep(FETCH_DELAY * 2).await;
    assert_eq!(source.fetches(), 2);
    let jwk = client.get_key("k1", None).await.expect("key must resolve");
    assert_eq!(modulus(&jwk), "two");
    assert_eq!(metrics.lookups(Lookup::Hit), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_stale_lookups_refresh_once() {
    let _tracing = trace_init();
    let source = TestSource::new(key_set(vec![key("k1", "sig", "one")]), FETCH_DELAY);
    let (client, _) = client(&source);
    client.get_key("k1", None).await.expect("key must resolve");
    assert_eq!(source.fetches(), 1);

    time::advance(REFRESH + Duration::from_secs(1)).await;
    let (a, b) = tokio::join!(client.get_key("k1", None), client.get_key("k1", None));
    a.expect("key must resolve");
    b.expect("key must resolve");

    time::sleep(FETCH_DELAY * 2).await;
    assert_eq!(source.fetches(), 2, "exactly one refresh must run");

    // The permit is released once the refresh completes, so a later stale lookup refreshes
    // again.
    time::advance(REFRESH + Duration::from_secs(1)).await;
    client.get_key("k1", None).await.expect("key must resolve");
    time::sleep(FETCH_DELAY * 2).await;
    assert_eq!(source.fetches(), 3);
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_stale_key() {
    let _tracing = trace_init();
    let source = TestSource::new(key_set(vec![key("k1", "sig", "one")]), FETCH_DELAY);
    let (client, metrics) = client(&source);
    client.get_key("k1", None).await.expect("key must resolve");

    source.fail(StatusCode::SERVICE_UNAVAILABLE);
    time::advance(REFRESH + Duration::from_secs(1)).await;
    let jwk = client.get_key("k1", None).await.expect("key must resolve");
    assert_eq!(modulus(&jwk), "one");

    time::sleep(FETCH_DELAY * 2).await;
    assert_eq!(source.fetches(), 2);
    assert_eq!(metrics.refreshes(false), 1);

    let jwk = client.get_key("k1", None).await.expect("stale key must still be served");
    assert_eq!(modulus(&jwk), "one");

    // The failed refresh released its permit, so this lookup started another one.
    time::sleep(FETCH_DELAY * 2).await;
    assert_eq!(source.fetches(), 3);
    assert_eq!(metrics.refreshes(false), 2);

    source.set_keys(key_set(vec![key("k1", "sig", "two")]));
    client.get_key("k1", None).await.expect("key must resolve");
    time::sleep(FETCH_DELAY * 2).await;
    assert_eq!(source.fetches(), 4);
    let jwk = client.get_key("k1", None).await.expect("key must resolve");
    assert_eq!(modulus(&jwk), "two");
}

#[test]
fn cancelled_refresh_releases_permit() {
    let _tracing = trace_init();
    let runtime = || {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .expect("runtime must build")
    };
    let source = TestSource::new(key_set(vec![key("k1", "sig", "one")]), FETCH_DELAY);

    let rt = runtime();
    let (client, _) = rt.block_on(async {
        let (client, metrics) = client(&source);
        client.get_key("k1", None).await.expect("key must resolve");

        source.stall();
        time::advance(REFRESH + Duration::from_secs(1)).await;
        client.get_key("k1", None).await.expect("stale key must be served");
        time::sleep(FETCH_DELAY * 2).await;
        assert_eq!(source.fetches(), 2);

        // The stalled refresh still holds the permit.
        client.get_key("k1", None).await.expect("stale key must be served");
        time::sleep(FETCH_DELAY * 2).await;
        assert_eq!(source.fetches(), 2);
        (client, metrics)
    });

    // Shutting down the runtime cancels the stalled refresh.
    drop(rt);

    source.set_keys(key_set(vec![key("k1", "sig", "two")]));
    runtime().block_on(async {
        time::advance(REFRESH + Duration::from_secs(1)).await;
        let jwk = client.get_key("k1", None).await.expect("stale key must be served");
        assert_eq!(modulus(&jwk), "one");

        time::sleep(FETCH_DELAY * 2).await;
        assert_eq!(source.fetches(), 3, "a new refresh must start");
        let jwk = client.get_key("k1", None).await.expect("key must resolve");
        assert_eq!(modulus(&jwk), "two");
    });
}

#[tokio::test(start_paused = true)]
async fn expired_key_is_fetched_synchronously() {
    let _tracing = trace_init();
    let source = TestSource::new(key_set(vec![key("k1", "sig", "one")]), FETCH_DELAY);
    let (client, metrics) = client(&source);
    client.get_key("k1", None).await.expect("key must resolve");

    source.set_keys(key_set(vec![key("k1", "sig", "two")]));
    time::advance(TTL).await;

    let jwk = client.get_key("k1", None).await.expect("key must resolve");
    assert_eq!(modulus(&jwk), "two");
    assert_eq!(source.fetches(), 2);
    assert_eq!(metrics.lookups(Lookup::Miss), 2);
    assert_eq!(metrics.lookups(Lookup::Stale), 0);
}

fn trace_init() -> tracing::subscriber::DefaultGuard {
    tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .finish(),
    )
}
