//! Observation rendered as the user message that models and humans read.

use crate::sim::types::{Observation, OrderTicket};

fn describe_ticket(ticket: &OrderTicket) -> String {
    ticket
        .items
        .iter()
        .map(|(product, qty)| format!("{qty} {product}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_orders(lines: &mut Vec<String>, heading: &str, tickets: &[OrderTicket]) {
    lines.push(String::new());
    lines.push(heading.to_string());
    for (i, ticket) in tickets.iter().enumerate() {
        lines.push(format!("- Order {}: {}", i + 1, describe_ticket(ticket)));
    }
}

pub fn format_observation_message(obs: &Observation) -> String {
    let summary = obs.last_turn_summary.as_ref();
    let queue_len = summary.map_or(0, |s| s.queue_end);
    let dropped = summary.map_or(0, |s| s.dropped_from_queue);
    let messages = summary.map(|s| s.messages.as_slice()).unwrap_or_default();
    let served = summary.map(|s| s.orders_served.as_slice()).unwrap_or_default();
    let unserved = summary
        .map(|s| s.unserved_orders.as_slice())
        .unwrap_or_default();

    let mut lines = vec![
        format!("Time: {}", obs.time),
        String::new(),
        format!("There are {queue_len} people waiting in the queue at the stall."),
    ];

    for message in messages {
        lines.push(String::new());
        lines.push(message.clone());
    }
    if messages.is_empty() && dropped > 0 {
        lines.push(String::new());
        lines.push(format!(
            "{dropped} {} left the queue after waiting more than half an hour.",
            if dropped == 1 { "person" } else { "people" }
        ));
    }

    if served.is_empty() {
        lines.push(String::new());
        lines.push("No orders were served in the last 15 minutes.".to_string());
    } else {
        push_orders(&mut lines, "Orders served in the last 15 minutes:", served);
    }

    if unserved.is_empty() {
        lines.push(String::new());
        lines.push("No orders were left unserved due to capacity.".to_string());
    } else {
        push_orders(
            &mut lines,
            "Orders that could not be served due to capacity:",
            unserved,
        );
    }

    lines.join("\n")
}
