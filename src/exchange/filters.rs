// =============================================================================
// Exchange filter cache — process-wide precision/step/notional lookup
// =============================================================================
//
// The only process-global structure in the engine. Read-mostly: every sizing
// and validation path reads it, and it refreshes from exchangeInfo on a miss
// or when the snapshot is older than the TTL. Concurrent readers share the
// RwLock read side; a refresh takes the write lock briefly to swap the map.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info};

use super::{Exchange, ExchangeError, SymbolFilters};

/// Default staleness bound for the cached exchangeInfo snapshot.
const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Cached `SymbolFilters` for every listed symbol.
pub struct FilterCache {
    inner: RwLock<HashMap<String, SymbolFilters>>,
    fetched_at: RwLock<Option<Instant>>,
    ttl: Duration,
}

impl FilterCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            fetched_at: RwLock::new(None),
            ttl,
        }
    }

    /// Look up filters for `symbol`, refreshing the whole snapshot from the
    /// exchange on a miss or when the cache has gone stale.
    pub async fn get(
        &self,
        exchange: &dyn Exchange,
        symbol: &str,
    ) -> Result<SymbolFilters, ExchangeError> {
        if self.is_fresh() {
            if let Some(found) = self.inner.read().get(symbol) {
                return Ok(found.clone());
            }
        }

        self.refresh(exchange).await?;

        self.inner.read().get(symbol).cloned().ok_or_else(|| {
            ExchangeError::NonRetryable(format!("symbol {symbol} not present in exchangeInfo"))
        })
    }

    /// Re-fetch the full exchangeInfo snapshot.
    pub async fn refresh(&self, exchange: &dyn Exchange) -> Result<(), ExchangeError> {
        debug!("refreshing exchange filter cache");
        let all = exchange.get_exchange_info().await?;

        let mut map = HashMap::with_capacity(all.len());
        for f in all {
            map.insert(f.symbol.clone(), f);
        }

        let count = map.len();
        *self.inner.write() = map;
        *self.fetched_at.write() = Some(Instant::now());

        info!(symbols = count, "exchange filter cache refreshed");
        Ok(())
    }

    fn is_fresh(&self) -> bool {
        self.fetched_at
            .read()
            .map(|t| t.elapsed() < self.ttl)
            .unwrap_or(false)
    }
}

impl Default for FilterCache {
    fn default() -> Self {
        Self::new()
    }
}
