use crate::orderbook::{OrderBook, PriceLevel};
use crate::sync::OfferRow;
use ahash::AHashMap;
use std::sync::Arc;
use strum_macros::Display;
use tracing::trace;

/// One directly tradeable link out of a graph node: the asset received on the
/// other side, the total quantity available across all tiers, and the tiers
/// themselves.
#[derive(Clone, Debug, PartialEq)]
pub struct LiquidityArc {
    pub counter_asset: String,
    pub capacity: f64,
    pub book: OrderBook,
}

impl LiquidityArc {
    /// Build an arc from already price-sorted levels, caching the capacity
    /// aggregate.
    pub fn from_levels(counter_asset: String, levels: &[PriceLevel]) -> Self {
        let capacity = levels.iter().map(|level| level.amount).sum();
        Self { counter_asset, capacity, book: levels.to_vec() }
    }
}

/// Mutation outcome of [`LiquidityGraph::apply_change`], traced for
/// observability only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

/// Directed graph of tradeable asset links, keyed by the asset an offer
/// delivers. A node holds at most one arc per distinct counter-asset.
///
/// The graph is an immutable value once published: [`apply_change`] produces
/// a fresh graph that shares untouched nodes with its predecessor via `Arc`,
/// so any search still running against an older snapshot keeps a fully
/// consistent view.
///
/// [`apply_change`]: LiquidityGraph::apply_change
#[derive(Clone, Debug, Default)]
pub struct LiquidityGraph {
    nodes: AHashMap<String, Arc<Vec<LiquidityArc>>>,
}

impl LiquidityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph wholesale from a snapshot of open offers: group by the
    /// asset delivered, then by the counter-asset wanted; sort each book
    /// ascending by price and sum amounts into capacity.
    pub fn build(offers: &[OfferRow]) -> Self {
        let mut grouped: AHashMap<String, AHashMap<String, Vec<PriceLevel>>> = AHashMap::new();

        for offer in offers {
            let (selling, buying) = offer.asset_pair();
            grouped
                .entry(selling)
                .or_default()
                .entry(buying)
                .or_default()
                .push(PriceLevel::new(offer.amount, offer.price));
        }

        let mut nodes = AHashMap::with_capacity(grouped.len());
        for (selling, counters) in grouped {
            let mut arcs = Vec::with_capacity(counters.len());
            for (buying, mut levels) in counters {
                levels.sort_by(|a, b| a.price.total_cmp(&b.price));
                arcs.push(LiquidityArc::from_levels(buying, &levels));
            }
            nodes.insert(selling, Arc::new(arcs));
        }

        Self { nodes }
    }

    /// Arcs leaving `asset`, if the asset is present at all.
    pub fn arcs(&self, asset: &str) -> Option<&[LiquidityArc]> {
        self.nodes.get(asset).map(|arcs| arcs.as_slice())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Produce a new graph with the `(selling, buying)` arc replaced by
    /// `levels` (already sorted ascending by price). Non-empty levels create
    /// or update the arc; empty levels delete it, dropping the node once its
    /// arc list runs dry. Only the touched node's arc list is rebuilt.
    pub fn apply_change(&self, selling: &str, buying: &str, levels: &[PriceLevel]) -> Self {
        let mut nodes = self.nodes.clone();

        let op = if !levels.is_empty() {
            let arc = LiquidityArc::from_levels(buying.to_string(), levels);

            match nodes.get(selling).cloned() {
                Some(arcs) => {
                    let mut replaced = arcs.as_ref().clone();
                    if let Some(index) = replaced.iter().position(|a| a.counter_asset == buying) {
                        replaced[index] = arc;
                        nodes.insert(selling.to_string(), Arc::new(replaced));
                        ChangeOp::Update
                    } else {
                        replaced.push(arc);
                        nodes.insert(selling.to_string(), Arc::new(replaced));
                        ChangeOp::Create
                    }
                }
                None => {
                    nodes.insert(selling.to_string(), Arc::new(vec![arc]));
                    ChangeOp::Create
                }
            }
        } else {
            if let Some(arcs) = nodes.get(selling).cloned() {
                let mut remaining = arcs.as_ref().clone();
                remaining.retain(|a| a.counter_asset != buying);
                if remaining.is_empty() {
                    nodes.remove(selling);
                } else {
                    nodes.insert(selling.to_string(), Arc::new(remaining));
                }
            }
            ChangeOp::Delete
        };

        trace!("{}: {} / {}", op, selling, buying);

        Self { nodes }
    }
}
