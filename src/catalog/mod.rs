//! Asset and contest catalogs.
//!
//! Catalogs are read-only snapshots the roster draws candidates from.
//! Asset snapshots are refreshed from `AssetSource` implementations
//! (CoinGecko, stock quotes); a failed fetch keeps the last good
//! snapshot. Refreshing never touches existing rosters.

pub mod coingecko;
pub mod contests;
pub mod stocks;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use tracing::{info, warn};

use crate::types::{Asset, AssetRef, Contest};

// ---------------------------------------------------------------------------
// Catalog traits
// ---------------------------------------------------------------------------

/// Selectable assets, as of the latest fetch.
pub trait AssetCatalog: Send + Sync {
    fn current_assets(&self) -> Vec<Asset>;

    /// Case-insensitive match on name or symbol; empty text matches all.
    fn search(&self, text: &str) -> Vec<Asset> {
        filter_assets(self.current_assets(), text)
    }

    fn find(&self, asset_id: &str) -> Option<Asset> {
        self.current_assets().into_iter().find(|a| a.id == asset_id)
    }

    /// Latest percentage move per asset id. Catalogs without price data
    /// report none.
    fn price_moves(&self) -> HashMap<String, Decimal> {
        HashMap::new()
    }
}

/// Contest records, as of the latest load.
pub trait ContestCatalog: Send + Sync {
    fn current_contests(&self) -> Vec<Contest>;

    fn find(&self, contest_id: u64) -> Option<Contest> {
        self.current_contests().into_iter().find(|c| c.id == contest_id)
    }
}

/// Keep assets whose name or symbol contains `text`, in order.
pub fn filter_assets(assets: Vec<Asset>, text: &str) -> Vec<Asset> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return assets;
    }
    assets
        .into_iter()
        .filter(|a| {
            a.name.to_lowercase().contains(&needle) || a.symbol.to_lowercase().contains(&needle)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Asset sources
// ---------------------------------------------------------------------------

/// Asset class a source supplies. Listing order follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetClass {
    Coin,
    Equity,
}

/// A remote feed of selectable assets.
#[async_trait]
pub trait AssetSource: Send + Sync {
    fn class(&self) -> AssetClass;

    async fn fetch_assets(&self) -> Result<Vec<AssetRef>>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Snapshot catalog
// ---------------------------------------------------------------------------

/// In-memory asset catalog holding the last good snapshot per class.
#[derive(Default)]
pub struct SnapshotCatalog {
    sections: RwLock<BTreeMap<AssetClass, Vec<AssetRef>>>,
}

impl SnapshotCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot for one asset class.
    pub fn replace(&self, class: AssetClass, assets: Vec<AssetRef>) {
        let mut sections = self.sections.write().unwrap_or_else(PoisonError::into_inner);
        sections.insert(class, assets);
    }

    /// Full tagged snapshot, coins before equities.
    pub fn asset_refs(&self) -> Vec<AssetRef> {
        let sections = self.sections.read().unwrap_or_else(PoisonError::into_inner);
        sections.values().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let sections = self.sections.read().unwrap_or_else(PoisonError::into_inner);
        sections.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AssetCatalog for SnapshotCatalog {
    fn current_assets(&self) -> Vec<Asset> {
        self.asset_refs().iter().map(AssetRef::to_asset).collect()
    }

    fn price_moves(&self) -> HashMap<String, Decimal> {
        self.asset_refs()
            .iter()
            .filter_map(|r| {
                let pct = Decimal::try_from(r.change_pct()).ok()?;
                Some((r.id(), pct.round_dp(4)))
            })
            .collect()
    }
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    pub failed: Vec<String>,
    pub total_assets: usize,
}

/// Fetch every source concurrently and swap in the snapshots that succeed.
pub async fn refresh(catalog: &SnapshotCatalog, sources: &[Box<dyn AssetSource>]) -> RefreshReport {
    let fetches = sources.iter().map(|s| async move { (s, s.fetch_assets().await) });
    let results = futures::future::join_all(fetches).await;

    let mut report = RefreshReport::default();
    for (source, result) in results {
        match result {
            Ok(assets) => {
                info!(source = source.name(), count = assets.len(), "Asset snapshot refreshed");
                catalog.replace(source.class(), assets);
                report.refreshed.push(source.name().to_string());
            }
            Err(e) => {
                warn!(source = source.name(), error = %e, "Asset fetch failed, keeping previous snapshot");
                report.failed.push(source.name().to_string());
            }
        }
    }
    report.total_assets = catalog.len();
    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
