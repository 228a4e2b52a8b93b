use crate::asset::{AssetType, asset_to_string, parse_asset};
use crate::orderbook::PriceLevel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure at the ledger-source boundary.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("query error: {0}")]
    Query(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// One open offer row as handed over by the ledger source, asset sides still
/// in their structured `(type, code, issuer)` form. Amounts arrive already
/// scaled to the internal 7-digit fixed-point representation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OfferRow {
    pub selling_asset_type: AssetType,
    pub selling_asset_code: Option<String>,
    pub selling_issuer: Option<String>,
    pub buying_asset_type: AssetType,
    pub buying_asset_code: Option<String>,
    pub buying_issuer: Option<String>,
    pub amount: f64,
    pub price: f64,
}

impl OfferRow {
    /// Build a row from canonical identities, mostly useful for tests and
    /// in-memory sources.
    pub fn from_identities(selling: &str, buying: &str, amount: f64, price: f64) -> Self {
        let (selling_asset_type, selling_asset_code, selling_issuer) = parse_asset(selling);
        let (buying_asset_type, buying_asset_code, buying_issuer) = parse_asset(buying);
        Self {
            selling_asset_type,
            selling_asset_code,
            selling_issuer,
            buying_asset_type,
            buying_asset_code,
            buying_issuer,
            amount,
            price,
        }
    }

    /// Canonical `(selling, buying)` identity pair: the asset this offer
    /// delivers and the counter-asset it wants.
    pub fn asset_pair(&self) -> (String, String) {
        let selling = asset_to_string(
            self.selling_asset_type,
            self.selling_asset_code.as_deref(),
            self.selling_issuer.as_deref(),
        );
        let buying = asset_to_string(
            self.buying_asset_type,
            self.buying_asset_code.as_deref(),
            self.buying_issuer.as_deref(),
        );
        (selling, buying)
    }
}

/// Change event delivered by the ledger's notification feed. The feed only
/// announces that something changed; fresh levels are re-fetched through the
/// [`LedgerSource`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerEvent {
    /// An offer for the given pair was inserted, updated or deleted.
    OfferChanged { selling: String, buying: String },
    /// The ledger committed a new state with this sequence number.
    LedgerAdvanced { sequence: u64 },
}

/// Read-side boundary to the backing ledger database. Implementations own
/// connection management and query shape; the synchronizer only consumes
/// already-fetched rows.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// All currently open offers, for full graph builds.
    async fn fetch_open_offers(&self) -> Result<Vec<OfferRow>, SourceError>;

    /// Current `(amount, price)` levels for one ordered pair, ascending by
    /// price, for incremental updates. An empty result means the pair has no
    /// open offers left.
    async fn fetch_levels(&self, selling: &str, buying: &str) -> Result<Vec<PriceLevel>, SourceError>;

    /// Asset identities the account is able to hold. The native asset is not
    /// included; callers append it.
    async fn account_assets(&self, account: &str) -> Result<Vec<String>, SourceError>;
}
