//! Per-turn order fulfillment.
//!
//! Orders are scanned oldest first against three budgets (customer slots,
//! grill output, drinks poured) and the stock on hand. Running out of
//! customer slots stops the scan and requeues everything left. Grill,
//! drink, and stock shortfalls only defer the order that hit them.

use crate::sim::config::{RecipeBook, Stations};
use crate::sim::types::{Order, OrderTicket, ProductCounts, StockMap};
use crate::sim::workers::WorkerCapacities;

/// Orders that have waited this many turns leave before service.
pub const MAX_QUEUE_WAIT_TURNS: usize = 2;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FulfillmentStats {
    pub new_customers: usize,
    pub served_customers: usize,
    /// Queue length after eviction, before new arrivals.
    pub queue_start: usize,
    pub queue_end: usize,
    pub blocked_by_customers_capacity: usize,
    pub blocked_by_grill_capacity: usize,
    pub blocked_by_drinks_capacity: usize,
    pub blocked_by_stock: bool,
    pub dropped_from_queue: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FulfillmentOutcome {
    /// Units sold per product; every product in the recipe book is present.
    pub sold: ProductCounts,
    pub orders_served: Vec<OrderTicket>,
    pub unserved_orders: Vec<OrderTicket>,
    /// Becomes the order queue for the next turn.
    pub next_queue: Vec<Order>,
    pub stats: FulfillmentStats,
}

/// Splits off orders that waited `MAX_QUEUE_WAIT_TURNS` or more.
/// Returns the survivors in their original order and the number dropped.
pub fn evict_stale_orders(queue: Vec<Order>, turn: usize) -> (Vec<Order>, usize) {
    let before = queue.len();
    let kept: Vec<Order> = queue
        .into_iter()
        .filter(|order| turn.saturating_sub(order.arrival_turn) < MAX_QUEUE_WAIT_TURNS)
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

fn station_load(order: &Order, recipes: &RecipeBook, ingredient: &str) -> f64 {
    order
        .items
        .iter()
        .map(|(product, qty)| {
            let per_unit = recipes
                .get(product)
                .and_then(|r| r.get(ingredient))
                .copied()
                .unwrap_or(0.0);
            per_unit * f64::from(*qty)
        })
        .sum()
}

fn ingredient_needs(order: &Order, recipes: &RecipeBook) -> StockMap {
    let mut needs = StockMap::new();
    for (product, qty) in &order.items {
        let Some(recipe) = recipes.get(product) else {
            continue;
        };
        for (ingredient, per_unit) in recipe {
            if *per_unit <= 0.0 {
                continue;
            }
            *needs.entry(ingredient.clone()).or_insert(0.0) += per_unit * f64::from(*qty);
        }
    }
    needs
}

/// Serves as many orders as the budgets and `stock` allow. Stock is debited
/// in place for every committed order.
pub fn fulfill_orders(
    queue: Vec<Order>,
    new_orders: Vec<Order>,
    turn: usize,
    capacities: &WorkerCapacities,
    stock: &mut StockMap,
    recipes: &RecipeBook,
    stations: &Stations,
) -> FulfillmentOutcome {
    let (queue, dropped_from_queue) = evict_stale_orders(queue, turn);
    let queue_start = queue.len();
    let new_customers = new_orders.len();

    let mut all_orders = queue;
    all_orders.extend(new_orders);

    let mut remaining_customers = capacities.customers_per_turn;
    let mut remaining_grill = capacities.grill_per_turn;
    let mut remaining_drinks = capacities.drinks_per_turn;

    let mut out = FulfillmentOutcome {
        sold: recipes.keys().map(|p| (p.clone(), 0)).collect(),
        ..Default::default()
    };
    let stats = &mut out.stats;

    let total = all_orders.len();
    let mut pending = all_orders.into_iter().enumerate();
    while let Some((idx, order)) = pending.next() {
        if remaining_customers <= 0.0 {
            // Hard stop: nobody left at the counter this turn.
            stats.blocked_by_customers_capacity += total - idx;
            for rest in std::iter::once(order).chain(pending.by_ref().map(|(_, o)| o)) {
                out.unserved_orders.push(OrderTicket::from(&rest));
                out.next_queue.push(rest);
            }
            break;
        }

        let grill_needed = station_load(&order, recipes, &stations.grill_ingredient);
        if grill_needed > remaining_grill + EPSILON {
            stats.blocked_by_grill_capacity += 1;
            out.unserved_orders.push(OrderTicket::from(&order));
            out.next_queue.push(order);
            continue;
        }

        let drinks_needed = station_load(&order, recipes, &stations.drink_ingredient);
        if drinks_needed > remaining_drinks + EPSILON {
            stats.blocked_by_drinks_capacity += 1;
            out.unserved_orders.push(OrderTicket::from(&order));
            out.next_queue.push(order);
            continue;
        }

        let needs = ingredient_needs(&order, recipes);
        let short = needs
            .iter()
            .any(|(ingredient, need)| *need > stock.get(ingredient).copied().unwrap_or(0.0) + EPSILON);
        if short {
            // Requeued without an unserved record; only the flag is raised.
            stats.blocked_by_stock = true;
            out.next_queue.push(order);
            continue;
        }

        for (ingredient, need) in needs {
            *stock.entry(ingredient).or_insert(0.0) -= need;
        }
        remaining_grill -= grill_needed;
        remaining_drinks -= drinks_needed;
        remaining_customers -= 1.0;
        stats.served_customers += 1;

        for (product, qty) in &order.items {
            *out.sold.entry(product.clone()).or_insert(0) += qty;
        }
        out.orders_served.push(OrderTicket::from(&order));
    }

    stats.new_customers = new_customers;
    stats.queue_start = queue_start;
    stats.queue_end = out.next_queue.len();
    stats.dropped_from_queue = dropped_from_queue;

    tracing::debug!(
        turn,
        served = stats.served_customers,
        queue_end = stats.queue_end,
        dropped = dropped_from_queue,
        "fulfilled orders"
    );
    out
}
