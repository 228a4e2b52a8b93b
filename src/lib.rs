// Layered architecture
pub mod sync;       // Data Layer: ledger source boundary, graph synchronization
pub mod graph;      // Logic Layer: liquidity graph store
pub mod finder;     // Logic Layer: path search
pub mod rest;       // Surface Layer: query endpoint

// Common building blocks and types
pub mod asset;
pub mod config;
pub mod logging;
pub mod orderbook;

// Re-export key components from each layer
pub use asset::{AssetType, NATIVE, asset_to_object, asset_to_string, parse_asset};
pub use config::{ApiConfig, AppConfig, ConfigError, FinderConfig, SyncConfig, load_from_file};
pub use finder::{FoundPath, PathFinder, PathsByTarget};
pub use graph::{ChangeOp, LiquidityArc, LiquidityGraph};
pub use logging::init_logging;
pub use orderbook::{OrderBook, PriceLevel, cost_to_buy, proceeds_from_sell, proceeds_from_sell_by_units};
pub use rest::ApiServer;
pub use sync::{GraphHandle, LedgerEvent, LedgerSource, LedgerSynchronizer, OfferRow, SourceError};
