use serde::{Deserialize, Serialize};

/// One price tier of an order book: `amount` units offered at `price`
/// counter-units per unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub amount: f64,
    pub price: f64,
}

impl PriceLevel {
    pub fn new(amount: f64, price: f64) -> Self {
        Self { amount, price }
    }
}

/// All open offers for one ordered asset pair, ascending by price. The sort
/// order is load-bearing: every walk below consumes the cheapest tier first.
pub type OrderBook = Vec<PriceLevel>;

/// Counter-units spent to buy `amount_to_buy` units off the book.
///
/// Walks tiers cheapest-first, consuming whole tiers until the remainder fits
/// inside one; that final tier is only partially consumed. If the book holds
/// less than `amount_to_buy` in total, the result covers only the tiers
/// present; callers check capacity separately.
pub fn cost_to_buy(book: &OrderBook, amount_to_buy: f64) -> f64 {
    let mut remaining = amount_to_buy;
    let mut amount_to_sell = 0.0;

    for level in book {
        if remaining > level.amount {
            amount_to_sell += level.amount * level.price;
            remaining -= level.amount;
        } else {
            amount_to_sell += remaining * level.price;
            break;
        }
    }

    amount_to_sell
}

/// Units received for selling `amount_to_sell` counter-units into the book.
///
/// Dual of [`cost_to_buy`]: tiers are consumed by value (`amount * price`),
/// with `remaining / price` credited at the final partial tier.
pub fn proceeds_from_sell(book: &OrderBook, amount_to_sell: f64) -> f64 {
    let mut remaining = amount_to_sell;
    let mut amount_to_buy = 0.0;

    for level in book {
        let level_value = level.amount * level.price;
        if remaining > level_value {
            amount_to_buy += level.amount;
            remaining -= level_value;
        } else {
            amount_to_buy += remaining / level.price;
            break;
        }
    }

    amount_to_buy
}

/// Variant of the sell walk used by the path search: tiers are consumed by
/// raw unit amount rather than by value, crediting `amount * price` per full
/// tier and `remaining * price` at the final partial one.
///
/// Deliberately not unified with [`proceeds_from_sell`]: the two call sites
/// carry distinct math and both are load-bearing.
pub fn proceeds_from_sell_by_units(book: &OrderBook, amount_to_sell: f64) -> f64 {
    let mut remaining = amount_to_sell;
    let mut amount_to_buy = 0.0;

    for level in book {
        if remaining > level.amount {
            amount_to_buy += level.amount * level.price;
            remaining -= level.amount;
        } else {
            amount_to_buy += remaining * level.price;
            break;
        }
    }

    amount_to_buy
}
