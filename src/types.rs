//! Shared types for LEAGUES.
//!
//! These types form the data model used across all modules.
//! Catalogs, the roster engine, the submission controller and the
//! persistence gateways all speak in terms of these structs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum number of selections a roster may hold.
pub const MAX_ROSTER_SIZE: usize = 5;

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// The common shape every selectable asset projects to.
///
/// Identity is `id`. Rosters hold their own copies, so an asset that
/// disappears from a catalog refresh stays in any roster that picked it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub image: Option<String>,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.symbol.to_uppercase())
    }
}

impl Asset {
    /// Helper to build a test asset with symbol-derived fields.
    #[cfg(test)]
    pub fn sample(id: &str, symbol: &str) -> Self {
        Asset {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: format!("{symbol} token"),
            image: None,
        }
    }
}

/// A cryptocurrency as returned by the CoinGecko markets endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub current_price: f64,
    /// 24-hour change in percent. CoinGecko reports null for thin markets.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub price_change_percentage_24h: f64,
}

/// An equity quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub changes_percentage: f64,
}

impl Stock {
    /// Stable identifier derived from the ticker, so roster membership
    /// survives a catalog refresh.
    pub fn asset_id(&self) -> String {
        format!("equity:{}", self.symbol.to_uppercase())
    }
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// Any selectable asset, tagged by class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum AssetRef {
    Coin(Coin),
    Equity(Stock),
}

impl AssetRef {
    pub fn id(&self) -> String {
        match self {
            AssetRef::Coin(c) => c.id.clone(),
            AssetRef::Equity(s) => s.asset_id(),
        }
    }

    /// Project onto the `Asset` shape the roster works with.
    pub fn to_asset(&self) -> Asset {
        match self {
            AssetRef::Coin(c) => Asset {
                id: c.id.clone(),
                symbol: c.symbol.clone(),
                name: c.name.clone(),
                image: (!c.image.is_empty()).then(|| c.image.clone()),
            },
            AssetRef::Equity(s) => Asset {
                id: s.asset_id(),
                symbol: s.symbol.to_uppercase(),
                name: s.name.clone(),
                image: None,
            },
        }
    }

    /// Latest 24h move in percent, whichever class this is.
    pub fn change_pct(&self) -> f64 {
        match self {
            AssetRef::Coin(c) => c.price_change_percentage_24h,
            AssetRef::Equity(s) => s.changes_percentage,
        }
    }
}

// ---------------------------------------------------------------------------
// Predictions & selections
// ---------------------------------------------------------------------------

/// Directional call on an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prediction {
    Up,
    Down,
}

impl Prediction {
    /// The opposite direction.
    pub fn opposite(&self) -> Self {
        match self {
            Prediction::Up => Prediction::Down,
            Prediction::Down => Prediction::Up,
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Up => write!(f, "UP"),
            Prediction::Down => write!(f, "DOWN"),
        }
    }
}

impl std::str::FromStr for Prediction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" | "long" => Ok(Prediction::Up),
            "down" | "short" => Ok(Prediction::Down),
            _ => Err(anyhow::anyhow!("Unknown prediction: {s}")),
        }
    }
}

/// One asset paired with a direction. Only ever lives inside a roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub asset: Asset,
    pub prediction: Prediction,
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.asset.symbol.to_uppercase(), self.prediction)
    }
}

// ---------------------------------------------------------------------------
// Contests
// ---------------------------------------------------------------------------

/// Contest lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContestState {
    Upcoming,
    Active,
    Finished,
}

impl ContestState {
    /// Whether rosters may still be submitted.
    pub fn is_open(&self) -> bool {
        matches!(self, ContestState::Upcoming | ContestState::Active)
    }
}

impl fmt::Display for ContestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContestState::Upcoming => write!(f, "Upcoming"),
            ContestState::Active => write!(f, "Active"),
            ContestState::Finished => write!(f, "Finished"),
        }
    }
}

/// Parse a contest state as reported by the contest source (case-insensitive).
impl std::str::FromStr for ContestState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upcoming" | "pending" => Ok(ContestState::Upcoming),
            "active" | "live" => Ok(ContestState::Active),
            "finished" | "ended" | "closed" => Ok(ContestState::Finished),
            _ => Err(anyhow::anyhow!("Unknown contest state: {s}")),
        }
    }
}

/// A time-boxed competition with a prize pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contest {
    pub id: u64,
    pub name: String,
    pub sport: String,
    pub entry_fee: Decimal,
    pub prize_pool: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_participants: u32,
    pub current_participants: u32,
    pub state: ContestState,
}

impl fmt::Display for Contest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} [{}] pool=${:.2} fee=${:.2} ({}/{})",
            self.id,
            self.name,
            self.state,
            self.prize_pool,
            self.entry_fee,
            self.current_participants,
            self.max_participants,
        )
    }
}

impl Contest {
    /// Fill ratio in `[0, 1]`. Zero when the contest has no cap.
    pub fn participation_progress(&self) -> f64 {
        if self.max_participants == 0 {
            return 0.0;
        }
        (self.current_participants as f64 / self.max_participants as f64).min(1.0)
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Helper to build a test contest in the given state.
    #[cfg(test)]
    pub fn sample(id: u64, state: ContestState) -> Self {
        use rust_decimal_macros::dec;
        Contest {
            id,
            name: format!("Contest {id}"),
            sport: "Crypto".to_string(),
            entry_fee: dec!(5),
            prize_pool: dec!(500),
            start_time: Utc::now(),
            end_time: Utc::now() + chrono::Duration::days(1),
            max_participants: 100,
            current_participants: 10,
            state,
        }
    }
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

/// The durable record of a roster committed to a contest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub owner: String,
    pub contest_id: u64,
    /// Selections in roster order; index is the stored position.
    pub roster_snapshot: Vec<Selection>,
    pub submitted_at: DateTime<Utc>,
}

impl fmt::Display for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let picks: Vec<String> = self.roster_snapshot.iter().map(|s| s.to_string()).collect();
        write!(
            f,
            "[{}] contest #{} by {}: {}",
            self.id,
            self.contest_id,
            self.owner,
            picks.join(", "),
        )
    }
}

impl Submission {
    /// Build a fresh submission stamped now.
    pub fn new(owner: &str, contest_id: u64, roster: &[Selection]) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            contest_id,
            roster_snapshot: roster.to_vec(),
            submitted_at: Utc::now(),
        }
    }

    /// Asset names in roster order.
    pub fn asset_names(&self) -> Vec<String> {
        self.roster_snapshot
            .iter()
            .map(|s| s.asset.name.clone())
            .collect()
    }
}

/// A persisted submission together with its settled score (zero until settled).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSubmission {
    pub submission: Submission,
    pub score: Decimal,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for lookups and projections.
#[derive(Debug, thiserror::Error)]
pub enum LeagueError {
    #[error("Asset not found: {0}")]
    UnknownAsset(String),

    #[error("Contest not found: {0}")]
    UnknownContest(u64),

    #[error("Contest #{contest_id} is not finished (state: {state})")]
    ContestNotFinished { contest_id: u64, state: ContestState },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_opposite() {
        assert_eq!(Prediction::Up.opposite(), Prediction::Down);
        assert_eq!(Prediction::Down.opposite(), Prediction::Up);
    }

    #[test]
    fn test_prediction_from_str() {
        assert_eq!("UP".parse::<Prediction>().unwrap(), Prediction::Up);
        assert_eq!("down".parse::<Prediction>().unwrap(), Prediction::Down);
        assert_eq!("short".parse::<Prediction>().unwrap(), Prediction::Down);
        assert!("sideways".parse::<Prediction>().is_err());
    }

    #[test]
    fn test_prediction_serialization() {
        assert_eq!(serde_json::to_string(&Prediction::Up).unwrap(), "\"Up\"");
        let parsed: Prediction = serde_json::from_str("\"Down\"").unwrap();
        assert_eq!(parsed, Prediction::Down);
    }

    #[test]
    fn test_contest_state_from_str() {
        assert_eq!("Active".parse::<ContestState>().unwrap(), ContestState::Active);
        assert_eq!("UPCOMING".parse::<ContestState>().unwrap(), ContestState::Upcoming);
        assert_eq!("ended".parse::<ContestState>().unwrap(), ContestState::Finished);
        assert!("paused".parse::<ContestState>().is_err());
    }

    #[test]
    fn test_contest_state_is_open() {
        assert!(ContestState::Upcoming.is_open());
        assert!(ContestState::Active.is_open());
        assert!(!ContestState::Finished.is_open());
    }

    #[test]
    fn test_participation_progress() {
        let mut contest = Contest::sample(1, ContestState::Active);
        contest.max_participants = 200;
        contest.current_participants = 50;
        assert!((contest.participation_progress() - 0.25).abs() < f64::EPSILON);

        contest.current_participants = 500;
        assert_eq!(contest.participation_progress(), 1.0);

        contest.max_participants = 0;
        assert_eq!(contest.participation_progress(), 0.0);
    }

    #[test]
    fn test_coin_projection() {
        let coin = AssetRef::Coin(Coin {
            id: "bitcoin".into(),
            symbol: "btc".into(),
            name: "Bitcoin".into(),
            image: "https://img.example/btc.png".into(),
            current_price: 65000.0,
            price_change_percentage_24h: 2.5,
        });
        let asset = coin.to_asset();
        assert_eq!(asset.id, "bitcoin");
        assert_eq!(asset.symbol, "btc");
        assert_eq!(asset.image.as_deref(), Some("https://img.example/btc.png"));
        assert_eq!(coin.id(), "bitcoin");
    }

    #[test]
    fn test_equity_identity_is_ticker_based() {
        let first = AssetRef::Equity(Stock {
            symbol: "aapl".into(),
            name: "Apple Inc.".into(),
            price: 190.0,
            changes_percentage: -0.4,
        });
        let refreshed = AssetRef::Equity(Stock {
            symbol: "AAPL".into(),
            name: "Apple Inc.".into(),
            price: 191.5,
            changes_percentage: 0.3,
        });
        assert_eq!(first.to_asset().id, "equity:AAPL");
        assert_eq!(first.to_asset().id, refreshed.to_asset().id);
        assert_eq!(first.to_asset().image, None);
    }

    #[test]
    fn test_coin_deserializes_null_change() {
        let json = r#"{"id":"x","symbol":"x","name":"X","image":"","current_price":1.0,
                       "price_change_percentage_24h":null}"#;
        let coin: Coin = serde_json::from_str(json).unwrap();
        assert_eq!(coin.price_change_percentage_24h, 0.0);
    }

    #[test]
    fn test_stock_deserializes_quote_shape() {
        let json = r#"{"symbol":"MSFT","name":"Microsoft","price":410.2,"changesPercentage":1.25,"volume":100}"#;
        let stock: Stock = serde_json::from_str(json).unwrap();
        assert_eq!(stock.symbol, "MSFT");
        assert!((stock.changes_percentage - 1.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_submission_asset_names_in_order() {
        let roster = vec![
            Selection { asset: Asset::sample("bitcoin", "btc"), prediction: Prediction::Up },
            Selection { asset: Asset::sample("ethereum", "eth"), prediction: Prediction::Down },
        ];
        let sub = Submission::new("0xabc", 7, &roster);
        assert_eq!(sub.asset_names(), vec!["btc token", "eth token"]);
        assert_eq!(sub.contest_id, 7);
        assert!(format!("{sub}").contains("BTC UP"));
    }
}
