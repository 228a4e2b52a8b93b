/// Liquidity Graph Store
///
/// Builds the directed graph of tradeable asset links from a snapshot of open
/// offers and applies incremental per-pair mutations, producing a fresh
/// copy-on-write graph value each time.
pub mod liquidity;

pub use liquidity::{ChangeOp, LiquidityArc, LiquidityGraph};
