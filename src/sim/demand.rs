//! Demand sampler.
//!
//! The stall competes with three symmetric competitors that charge the
//! reference prices. Market customers per turn come from the configured
//! curve; the stall's share follows a constant-elasticity attraction model
//! on the expected ticket of each side. Every customer then draws one order
//! profile from the mix active for the turn.

use std::collections::BTreeMap;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::sim::config::DemandParams;
use crate::sim::types::{Order, PriceMap, ProductCounts};

const COMPETITORS: f64 = 3.0;
const COMPETITOR_ATTRACTION: f64 = 1.0;
const MIN_TICKET: f64 = 1e-6;
const MIN_TOTAL_ATTRACTION: f64 = 1e-12;
/// Upper bound on new customers sampled in one turn.
pub const MAX_NEW_CUSTOMERS: usize = 100_000;

/// New customers arriving at the stall in one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DemandBatch {
    pub orders: Vec<Order>,
    pub new_customers: usize,
    /// Units requested by the new customers only.
    pub demand_products: ProductCounts,
}

/// Profile probabilities for `turn`.
///
/// Falls back to the last configured segment, then to a uniform mix over
/// all profiles, then to an empty mix when no profiles exist.
pub fn active_profile_mix(params: &DemandParams, turn: usize) -> BTreeMap<String, f64> {
    if let Some(segment) = params
        .order_mix_segments
        .iter()
        .find(|s| s.from_turn <= turn && turn <= s.to_turn)
    {
        return segment.profile_probs.clone();
    }
    if let Some(last) = params.order_mix_segments.last() {
        return last.profile_probs.clone();
    }
    if params.order_profiles.is_empty() {
        return BTreeMap::new();
    }
    let uniform = 1.0 / params.order_profiles.len() as f64;
    params
        .order_profiles
        .keys()
        .map(|name| (name.clone(), uniform))
        .collect()
}

/// Probability-weighted ticket of one customer at the given prices.
pub fn expected_ticket(prices: &PriceMap, params: &DemandParams, turn: usize) -> f64 {
    let mix = active_profile_mix(params, turn);
    if mix.is_empty() {
        if prices.is_empty() {
            return 0.0;
        }
        return prices.values().sum::<f64>() / prices.len() as f64;
    }

    let total: f64 = mix.values().sum();
    let uniform = 1.0 / mix.len() as f64;
    mix.iter()
        .map(|(name, prob)| {
            let weight = if total > 0.0 { prob / total } else { uniform };
            let ticket: f64 = params
                .order_profiles
                .get(name)
                .map(|profile| {
                    profile
                        .iter()
                        .map(|(product, qty)| {
                            f64::from(*qty) * prices.get(product).copied().unwrap_or(0.0)
                        })
                        .sum()
                })
                .unwrap_or(0.0);
            weight * ticket
        })
        .sum()
}

/// The stall's share of market customers against three competitors with
/// attraction 1 each.
pub fn market_share(ticket_agent: f64, ticket_competitor: f64, elasticity: f64) -> f64 {
    let ticket_agent = ticket_agent.max(MIN_TICKET);
    let ticket_competitor = ticket_competitor.max(MIN_TICKET);
    let attraction = (ticket_agent / ticket_competitor).powf(-elasticity);
    if attraction.is_infinite() {
        return 1.0;
    }
    let total = attraction + COMPETITORS * COMPETITOR_ATTRACTION;
    if !(total > MIN_TOTAL_ATTRACTION) {
        return 0.0;
    }
    attraction / total
}

fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // Box-Muller; u1 in (0, 1] keeps ln finite.
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

pub fn sample_customer_count<R: Rng + ?Sized>(
    prices: &PriceMap,
    params: &DemandParams,
    turn: usize,
    rng: &mut R,
) -> usize {
    let market_customers = params.customers_curve.get(turn).copied().unwrap_or(0.0);
    let ticket_agent = expected_ticket(prices, params, turn);
    let ticket_competitor = expected_ticket(&params.price_ref, params, turn);
    let share = market_share(ticket_agent, ticket_competitor, params.elasticity_customers);

    let noise = if params.noise_std > 0.0 {
        (params.noise_std * standard_normal(rng)).exp()
    } else {
        1.0
    };

    // NaN and negative products collapse to zero; huge ones hit the cap.
    let expected = (market_customers * share * noise)
        .max(0.0)
        .min(MAX_NEW_CUSTOMERS as f64);
    expected.round_ties_even() as usize
}

fn sample_profile<'a, R: Rng + ?Sized>(
    mix: &'a BTreeMap<String, f64>,
    rng: &mut R,
) -> Option<&'a String> {
    let names: Vec<&String> = mix.keys().collect();
    if names.is_empty() {
        return None;
    }
    let idx = match WeightedIndex::new(mix.values().copied()) {
        Ok(dist) => dist.sample(rng),
        // All weights zero: uniform mix.
        Err(_) => rng.gen_range(0..names.len()),
    };
    names.get(idx).copied()
}

/// Draws this turn's new orders at the stall's current prices.
pub fn sample_orders<R: Rng + ?Sized>(
    prices: &PriceMap,
    params: &DemandParams,
    turn: usize,
    rng: &mut R,
) -> DemandBatch {
    let new_customers = sample_customer_count(prices, params, turn, rng);
    let mix = active_profile_mix(params, turn);

    let mut demand_products: ProductCounts = prices.keys().map(|p| (p.clone(), 0)).collect();
    let mut orders = Vec::with_capacity(new_customers);
    for _ in 0..new_customers {
        let Some(profile_name) = sample_profile(&mix, rng) else {
            break;
        };
        let Some(items) = params.order_profiles.get(profile_name) else {
            continue;
        };
        for (product, qty) in items {
            *demand_products.entry(product.clone()).or_insert(0) += qty;
        }
        orders.push(Order {
            items: items.clone(),
            arrival_turn: turn,
        });
    }

    tracing::debug!(turn, new_customers, orders = orders.len(), "sampled demand");
    DemandBatch {
        orders,
        new_customers,
        demand_products,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::config::{OrderMixSegment, OrderProfile};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn profile(items: &[(&str, u32)]) -> OrderProfile {
        items.iter().map(|(p, q)| (p.to_string(), *q)).collect()
    }

    fn prices(pairs: &[(&str, f64)]) -> PriceMap {
        pairs.iter().map(|(p, v)| (p.to_string(), *v)).collect()
    }

    fn params() -> DemandParams {
        let mut order_profiles = BTreeMap::new();
        order_profiles.insert("solo".to_string(), profile(&[("pintxo", 1)]));
        order_profiles.insert("combo".to_string(), profile(&[("pintxo", 2), ("sidra", 1)]));
        DemandParams {
            price_ref: prices(&[("pintxo", 2.0), ("sidra", 3.0)]),
            elasticity: BTreeMap::new(),
            noise_std: 0.0,
            customers_curve: vec![40.0, 80.0],
            elasticity_customers: 1.5,
            order_profiles,
            order_mix_segments: vec![
                OrderMixSegment {
                    from_turn: 0,
                    to_turn: 0,
                    profile_probs: [("solo".to_string(), 1.0)].into_iter().collect(),
                },
                OrderMixSegment {
                    from_turn: 1,
                    to_turn: 1,
                    profile_probs: [("solo".to_string(), 1.0), ("combo".to_string(), 3.0)]
                        .into_iter()
                        .collect(),
                },
            ],
        }
    }

    #[test]
    fn segment_lookup_falls_back_to_last_then_uniform() {
        let mut p = params();
        assert_eq!(active_profile_mix(&p, 0).len(), 1);
        assert_eq!(active_profile_mix(&p, 99).len(), 2);

        p.order_mix_segments.clear();
        let uniform = active_profile_mix(&p, 0);
        assert!((uniform["solo"] - 0.5).abs() < 1e-12);

        p.order_profiles.clear();
        assert!(active_profile_mix(&p, 0).is_empty());
    }

    #[test]
    fn expected_ticket_normalizes_profile_weights() {
        let p = params();
        let ticket = expected_ticket(&p.price_ref, &p, 1);
        // 0.25 * 2.0 + 0.75 * (2 * 2.0 + 3.0)
        assert!((ticket - 5.75).abs() < 1e-9);
    }

    #[test]
    fn equal_prices_give_a_quarter_share() {
        assert!((market_share(5.0, 5.0, 1.5) - 0.25).abs() < 1e-12);
        assert!(market_share(10.0, 5.0, 1.5) < 0.25);
        assert!(market_share(0.0, 5.0, 1.5) > 0.25);
    }

    #[test]
    fn zero_tickets_are_clamped() {
        let share = market_share(0.0, 0.0, 2.0);
        assert!((share - 0.25).abs() < 1e-12);
    }

    #[test]
    fn overwhelming_price_advantage_takes_the_whole_market() {
        assert_eq!(market_share(1e-6, 1e6, 200.0), 1.0);
        assert!(market_share(1e6, 1e-6, 200.0) < 1e-12);
    }

    #[test]
    fn huge_market_is_capped() {
        let mut p = params();
        p.customers_curve = vec![1e30];
        let batch = sample_orders(&p.price_ref, &p, 0, &mut ChaCha8Rng::seed_from_u64(5));
        assert_eq!(batch.new_customers, MAX_NEW_CUSTOMERS);
        assert_eq!(batch.orders.len(), MAX_NEW_CUSTOMERS);

        p.customers_curve = vec![40.0];
        p.noise_std = 1e6;
        let count = sample_customer_count(&p.price_ref, &p, 0, &mut ChaCha8Rng::seed_from_u64(5));
        assert!(count <= MAX_NEW_CUSTOMERS);
    }

    #[test]
    fn noiseless_count_is_rounded_share_of_market() {
        let p = params();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        // Reference prices give a 25% share of 40 market customers.
        assert_eq!(sample_customer_count(&p.price_ref, &p, 0, &mut rng), 10);
        // Past the end of the curve there is no market.
        assert_eq!(sample_customer_count(&p.price_ref, &p, 5, &mut rng), 0);
    }

    #[test]
    fn orders_carry_turn_and_aggregate_demand() {
        let p = params();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let batch = sample_orders(&p.price_ref, &p, 0, &mut rng);
        assert_eq!(batch.new_customers, 10);
        assert_eq!(batch.orders.len(), 10);
        assert!(batch.orders.iter().all(|o| o.arrival_turn == 0));
        assert_eq!(batch.demand_products["pintxo"], 10);
        assert_eq!(batch.demand_products["sidra"], 0);
    }

    #[test]
    fn same_seed_same_orders() {
        let mut p = params();
        p.noise_std = 0.3;
        let a = sample_orders(&p.price_ref, &p, 1, &mut ChaCha8Rng::seed_from_u64(3));
        let b = sample_orders(&p.price_ref, &p, 1, &mut ChaCha8Rng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn no_profiles_means_no_orders() {
        let mut p = params();
        p.order_profiles.clear();
        p.order_mix_segments.clear();
        let batch = sample_orders(&p.price_ref, &p, 0, &mut ChaCha8Rng::seed_from_u64(1));
        assert!(batch.orders.is_empty());
    }
}
