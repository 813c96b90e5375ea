use super::*;
use parking_lot::Mutex;
use tokio::time;

fn init_tracing() -> tracing::subscriber::DefaultGuard {
    tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .finish(),
    )
}

#[tokio::test(start_paused = true)]
async fn expires_at_deadline() {
    let _tracing = init_tracing();
    let cache = Cache::new(Duration::ZERO);
    cache.store("a", 1, Expiration::After(Duration::from_secs(10)));

    time::advance(Duration::from_millis(9_999)).await;
    assert_eq!(cache.get("a"), Some(1), "must be live before the deadline");

    time::advance(Duration::from_millis(1)).await;
    assert_eq!(cache.get("a"), None, "must be expired at the deadline");

    time::advance(Duration::from_secs(60)).await;
    assert_eq!(cache.get("a"), None, "must be expired after the deadline");
}

#[tokio::test(start_paused = true)]
async fn default_expiration() {
    let _tracing = init_tracing();

    let cache = Cache::new(Duration::from_secs(5));
    cache.store("a", "default", Expiration::Default);
    cache.store("b", "zero", Expiration::After(Duration::ZERO));
    time::advance(Duration::from_secs(4)).await;
    assert_eq!(cache.get("a"), Some("default"));
    assert_eq!(cache.get("b"), Some("zero"));
    time::advance(Duration::from_secs(1)).await;
    assert_eq!(cache.get("a"), None);
    assert_eq!(cache.get("b"), None);

    // A zero default means entries never expire.
    let cache = Cache::new(Duration::ZERO);
    cache.store("a", "default", Expiration::Default);
    time::advance(Duration::from_secs(60 * 60 * 24 * 365)).await;
    assert_eq!(cache.get("a"), Some("default"));
}

#[tokio::test(start_paused = true)]
async fn never_expires() {
    let _tracing = init_tracing();
    let cache = Cache::new(Duration::from_secs(1));
    cache.store("a", 1, Expiration::Never);

    time::advance(Duration::from_secs(10 * 365 * 24 * 60 * 60)).await;
    assert_eq!(cache.get("a"), Some(1));
    assert_eq!(cache.delete_expired(), 0);
}

#[tokio::test(start_paused = true)]
async fn store_overwrites() {
    let _tracing = init_tracing();
    let cache = Cache::new(Duration::ZERO);
    cache.store("a", 1, Expiration::After(Duration::from_secs(1)));
    cache.store("a", 2, Expiration::Never);

    time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get("a"), Some(2));
    assert_eq!(cache.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn add_rejects_live_entries() {
    let _tracing = init_tracing();
    let cache = Cache::new(Duration::ZERO);
    let ttl = Expiration::After(Duration::from_secs(10));

    cache.add("a", 1, ttl).expect("first add must succeed");
    assert_eq!(
        cache.add("a", 2, ttl),
        Err(Error::AlreadyExists("a".to_string()))
    );
    assert_eq!(cache.get("a"), Some(1), "rejected add must not modify the entry");

    time::advance(Duration::from_secs(10)).await;
    cache.add("a", 3, ttl).expect("add must replace an expired entry");
    assert_eq!(cache.get("a"), Some(3));
}

#[tokio::test(start_paused = true)]
async fn get_does_not_delete() {
    let _tracing = init_tracing();
    let cache = Cache::new(Duration::ZERO);
    cache.store("a", 1, Expiration::After(Duration::from_secs(1)));
    cache.store("b", 2, Expiration::Never);

    time::advance(Duration::from_secs(1)).await;
    assert_eq!(cache.get("a"), None);
    assert_eq!(cache.len(), 2, "expired entries are left for the sweeper");

    assert_eq!(cache.delete_expired(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("b"), Some(2));
}

#[tokio::test(start_paused = true)]
async fn sweeper_evicts_exactly_once() {
    let _tracing = init_tracing();
    let cache = Cache::new(Duration::ZERO);
    let evicted = Arc::new(Mutex::new(Vec::new()));
    cache.on_evicted({
        let evicted = evicted.clone();
        move |key, value| evicted.lock().push((key, value))
    });

    let ttl = Expiration::After(Duration::from_secs(1));
    cache.store("a", 1, ttl);
    // Overwriting an entry is not an eviction.
    cache.store("a", 2, ttl);
    cache.store("b", 3, ttl);
    cache.store("c", 4, ttl);
    cache.store("d", 5, Expiration::Never);

    let sweeper = cache
        .spawn_sweeper(Duration::from_secs(1))
        .expect("sweeper must be spawned");
    time::sleep(Duration::from_secs(5)).await;
    sweeper.stop().await;

    let mut evicted = evicted.lock().clone();
    evicted.sort();
    assert_eq!(
        evicted,
        vec![
            ("a".to_string(), 2),
            ("b".to_string(), 3),
            ("c".to_string(), 4)
        ]
    );
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("d"), Some(5));
}

#[tokio::test(start_paused = true)]
async fn eviction_callback_may_use_cache() {
    let _tracing = init_tracing();
    let cache = Cache::new(Duration::ZERO);
    cache.on_evicted({
        let cache = cache.clone();
        move |key, value: u32| cache.store(format!("{key}-evicted"), value, Expiration::Never)
    });
    cache.store("a", 1, Expiration::After(Duration::from_secs(1)));

    time::advance(Duration::from_secs(1)).await;
    assert_eq!(cache.delete_expired(), 1);
    assert_eq!(cache.get("a-evicted"), Some(1));
}

#[tokio::test(start_paused = true)]
async fn stopped_sweeper_leaves_entries() {
    let _tracing = init_tracing();
    let cache = Cache::new(Duration::ZERO);
    cache.store("a", 1, Expiration::After(Duration::from_secs(1)));

    let sweeper = cache
        .spawn_sweeper(Duration::from_secs(2))
        .expect("sweeper must be spawned");
    sweeper.stop().await;

    time::sleep(Duration::from_secs(10)).await;
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("a"), None);
}

#[tokio::test]
async fn sweeper_disabled() {
    let cache = Cache::<()>::new(Duration::ZERO);
    assert!(cache.spawn_sweeper(Duration::ZERO).is_none());
}
