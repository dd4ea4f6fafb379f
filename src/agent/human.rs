//! Terminal player. Same six tools as every other agent, typed as short
//! commands.

use std::io::{BufRead, Write};

use crate::agent::llm::SYSTEM_PROMPT;
use crate::agent::message::format_observation_message;
use crate::sim::decider::{AgentError, Decider};
use crate::sim::tools::{Action, AssignmentRequest, ToolExecutor, ToolResult};
use crate::sim::types::{Observation, PriceMap, StockMap};
use crate::sim::workers::WorkerId;

const HELP: &str = "\
Commands:
  status                              get_status
  prices                              get_prices
  set_prices <product>=<price> ...    set_prices
  assign <id>=<task> ...              assign_workers (replaces all assignments)
  order <ingredient>=<qty> ... workers=<id>,<id>
                                      place_order
  end                                 end_turn
  instructions                        show the game instructions
  help                                show this list
Tasks: serve_customers, grill, prep, pour_drinks, go_shopping";

pub struct HumanAgent<R, W> {
    input: R,
    output: W,
}

impl HumanAgent<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

fn io_err(e: std::io::Error) -> AgentError {
    AgentError::Input(e.to_string())
}

fn parse_pairs(args: &[&str]) -> Result<Vec<(String, String)>, String> {
    args.iter()
        .map(|arg| {
            arg.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| format!("expected key=value, got '{arg}'"))
        })
        .collect()
}

fn parse_number(key: &str, value: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .map_err(|_| format!("'{value}' is not a number for {key}"))
}

/// Turns one command line into an action. `Ok(None)` means the line was
/// handled locally (help, blank input).
pub(crate) fn parse_command(line: &str) -> Result<Option<Action>, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((command, args)) = parts.split_first() else {
        return Ok(None);
    };
    match *command {
        "status" => Ok(Some(Action::GetStatus)),
        "prices" => Ok(Some(Action::GetPrices)),
        "end" | "end_turn" => Ok(Some(Action::EndTurn)),
        "set_prices" => {
            let mut prices = PriceMap::new();
            for (product, value) in parse_pairs(args)? {
                let price = parse_number(&product, &value)?;
                prices.insert(product, price);
            }
            Ok(Some(Action::SetPrices { prices }))
        }
        "assign" | "assign_workers" => {
            let mut assignments = Vec::new();
            for (id, task) in parse_pairs(args)? {
                let employee_id = id
                    .parse::<WorkerId>()
                    .map_err(|_| format!("'{id}' is not a worker id"))?;
                assignments.push(AssignmentRequest { employee_id, task });
            }
            Ok(Some(Action::AssignWorkers { assignments }))
        }
        "order" | "place_order" => {
            let mut quantities = StockMap::new();
            let mut workers = Vec::new();
            for (key, value) in parse_pairs(args)? {
                if key == "workers" {
                    for id in value.split(',').filter(|s| !s.is_empty()) {
                        workers.push(
                            id.trim()
                                .parse::<WorkerId>()
                                .map_err(|_| format!("'{id}' is not a worker id"))?,
                        );
                    }
                } else {
                    let qty = parse_number(&key, &value)?;
                    quantities.insert(key, qty);
                }
            }
            Ok(Some(Action::PlaceOrder {
                quantities,
                workers,
            }))
        }
        other => Err(format!("unknown command '{other}', type 'help'")),
    }
}

impl<R: BufRead, W: Write> HumanAgent<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn report(&mut self, action: &Action, result: &ToolResult) -> Result<(), AgentError> {
        if !result.ok {
            let reason = result.reason.as_deref().unwrap_or("rejected");
            return writeln!(self.output, "  rejected: {reason}").map_err(io_err);
        }
        match action {
            Action::GetStatus => {
                writeln!(self.output, "  cash: {:.2} EUR", result.cash.unwrap_or_default())
                    .map_err(io_err)?;
                for (ingredient, qty) in result.stock_on_hand.iter().flatten() {
                    writeln!(self.output, "  stock {ingredient}: {qty}").map_err(io_err)?;
                }
                for delivery in result.inbound_deliveries.iter().flatten() {
                    writeln!(
                        self.output,
                        "  arriving at {}: {:?}",
                        delivery.arrival_time, delivery.quantities
                    )
                    .map_err(io_err)?;
                }
                for a in result.worker_assignments.iter().flatten() {
                    writeln!(self.output, "  worker {}: {}", a.employee_id, a.task)
                        .map_err(io_err)?;
                }
                for (worker, left) in result.workers_on_trip.iter().flatten() {
                    writeln!(self.output, "  worker {worker}: shopping, back in {left} turn(s)")
                        .map_err(io_err)?;
                }
            }
            Action::GetPrices => {
                for (product, price) in result.current_prices.iter().flatten() {
                    writeln!(self.output, "  {product}: {price:.2} EUR").map_err(io_err)?;
                }
            }
            _ => writeln!(self.output, "  ok").map_err(io_err)?,
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> Decider for HumanAgent<R, W> {
    fn name(&self) -> String {
        "human".to_string()
    }

    async fn decide(
        &mut self,
        obs: &Observation,
        tools: &mut ToolExecutor<'_>,
    ) -> Result<Vec<Action>, AgentError> {
        let rule = "=".repeat(80);
        writeln!(self.output, "\n{rule}\nTurn {} - {}\n{rule}\n", obs.turn, obs.time)
            .map_err(io_err)?;
        writeln!(self.output, "{}\n\n{HELP}", format_observation_message(obs)).map_err(io_err)?;

        let mut actions = Vec::new();
        loop {
            write!(self.output, "\n> ").map_err(io_err)?;
            self.output.flush().map_err(io_err)?;
            let mut line = String::new();
            if self.input.read_line(&mut line).map_err(io_err)? == 0 {
                return Err(AgentError::Input("input closed before end_turn".to_string()));
            }
            match line.trim() {
                "help" | "?" => {
                    writeln!(self.output, "{HELP}").map_err(io_err)?;
                    continue;
                }
                "instructions" => {
                    writeln!(self.output, "{SYSTEM_PROMPT}").map_err(io_err)?;
                    continue;
                }
                _ => {}
            }
            match parse_command(&line) {
                Ok(None) => {}
                Ok(Some(action)) => {
                    let result = tools.execute(&action);
                    self.report(&action, &result)?;
                    let done = action == Action::EndTurn;
                    actions.push(action);
                    if done {
                        return Ok(actions);
                    }
                }
                Err(message) => writeln!(self.output, "  {message}").map_err(io_err)?,
            }
        }
    }
}
