use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

/// JWKS client metrics.
///
/// A default instance records values without exporting them.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    lookups: Family<LookupLabels, Counter>,
    refreshes: Family<RefreshLabels, Counter>,
    evictions: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct LookupLabels {
    outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RefreshLabels {
    result: &'static str,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Lookup {
    Hit,
    Stale,
    Miss,
}

// === impl Metrics ===

impl Metrics {
    pub fn register(reg: &mut Registry) -> Self {
        let lookups = Family::<LookupLabels, Counter>::default();
        reg.register(
            "lookups",
            "Count of key lookups by cache outcome",
            lookups.clone(),
        );

        let refreshes = Family::<RefreshLabels, Counter>::default();
        reg.register(
            "refreshes",
            "Count of key set fetches by result",
            refreshes.clone(),
        );

        let evictions = Counter::default();
        reg.register(
            "evictions",
            "Count of expired keys removed from the cache",
            evictions.clone(),
        );

        Self {
            lookups,
            refreshes,
            evictions,
        }
    }

    pub(crate) fn lookup(&self, lookup: Lookup) {
        let outcome = match lookup {
            Lookup::Hit => "hit",
            Lookup::Stale => "stale",
            Lookup::Miss => "miss",
        };
        self.lookups.get_or_create(&LookupLabels { outcome }).inc();
    }

    pub(crate) fn refreshed(&self, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        self.refreshes.get_or_create(&RefreshLabels { result }).inc();
    }

    pub(crate) fn evicted(&self) {
        self.evictions.inc();
    }

    #[cfg(test)]
    pub(crate) fn lookups(&self, lookup: Lookup) -> u64 {
        let outcome = match lookup {
            Lookup::Hit => "hit",
            Lookup::Stale => "stale",
            Lookup::Miss => "miss",
        };
        self.lookups.get_or_create(&LookupLabels { outcome }).get()
    }

    #[cfg(test)]
    pub(crate) fn refreshes(&self, ok: bool) -> u64 {
        let result = if ok { "ok" } else { "error" };
        self.refreshes.get_or_create(&RefreshLabels { result }).get()
    }
}
