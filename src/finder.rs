use crate::asset::NATIVE;
use crate::graph::LiquidityGraph;
use crate::orderbook::proceeds_from_sell_by_units;
use ahash::AHashMap;

/// Default maximum path length, counted as the destination plus every asset
/// expanded on the way back to a source (at most 5 intermediate hops between
/// source and destination).
pub const DEFAULT_MAX_PATH_LEN: usize = 7;

/// One discovered route: the amount of the source asset required, and the
/// intermediate assets between source and destination (both endpoints
/// excluded), in payment order.
#[derive(Clone, Debug, PartialEq)]
pub struct FoundPath {
    pub source_amount: f64,
    pub hops: Vec<String>,
}

/// Search results keyed by target (held) asset. Every requested target is
/// present, possibly with an empty list.
pub type PathsByTarget = AHashMap<String, Vec<FoundPath>>;

/// Backward, depth-bounded, cost-pruned depth-first search over a liquidity
/// graph snapshot.
///
/// The search starts at the destination asset with the amount to deliver and
/// walks arcs backward, converting the required amount through each arc's
/// order book. It is pure and side-effect free; a snapshot captured at call
/// time stays consistent for the whole search.
pub struct PathFinder {
    /// Maximum path length including the destination.
    max_path_len: usize,
}

impl Default for PathFinder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PATH_LEN)
    }
}

impl PathFinder {
    pub fn new(max_path_len: usize) -> Self {
        Self { max_path_len }
    }

    /// Find, for every asset in `targets`, the routes that deliver
    /// `dest_amount` of `dest_asset` and the input each requires.
    ///
    /// Discovery order within a target's list follows arc iteration order; no
    /// post-sort by cost is applied.
    pub fn find_paths(
        &self,
        graph: &LiquidityGraph,
        targets: &[String],
        dest_asset: &str,
        dest_amount: f64,
    ) -> PathsByTarget {
        // native-to-native needs no traversal at all
        if dest_asset == NATIVE && targets.len() == 1 && targets[0] == NATIVE {
            let mut paths = PathsByTarget::new();
            paths.insert(NATIVE.to_string(), vec![FoundPath { source_amount: dest_amount, hops: Vec::new() }]);
            return paths;
        }

        let mut state = SearchState {
            paths: targets.iter().map(|asset| (asset.clone(), Vec::new())).collect(),
            lowest_cost: AHashMap::new(),
            stack: Vec::new(),
        };

        self.search(graph, &mut state, dest_asset, dest_amount);

        state.paths
    }

    fn search(&self, graph: &LiquidityGraph, state: &mut SearchState, asset: &str, amount_in: f64) {
        if state.stack.iter().any(|visited| visited == asset) {
            return;
        }

        // a previously discovered route reached this asset at least as
        // cheaply, so nothing further down this branch can improve on it
        match state.lowest_cost.get(asset) {
            Some(&cost) if amount_in >= cost => return,
            _ => {
                state.lowest_cost.insert(asset.to_string(), amount_in);
            }
        }

        if let Some(found) = state.paths.get_mut(asset) {
            // drop the synthetic destination root and restore payment order
            let hops = state.stack.iter().skip(1).rev().cloned().collect();
            found.push(FoundPath { source_amount: amount_in, hops });
        }

        if state.stack.len() + 1 >= self.max_path_len {
            return;
        }

        if let Some(arcs) = graph.arcs(asset) {
            state.stack.push(asset.to_string());
            for arc in arcs {
                if arc.capacity >= amount_in {
                    let amount_out = proceeds_from_sell_by_units(&arc.book, amount_in);
                    self.search(graph, state, &arc.counter_asset, amount_out);
                }
            }
            state.stack.pop();
        }
    }
}

struct SearchState {
    paths: PathsByTarget,
    lowest_cost: AHashMap<String, f64>,
    stack: Vec<String>,
}
