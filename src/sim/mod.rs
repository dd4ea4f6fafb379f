//! Discrete-time simulation of a single food-and-drink stall.

pub mod config;
pub mod decider;
pub mod demand;
pub mod engine;
pub mod error;
pub mod fulfillment;
pub mod tools;
pub mod types;
pub mod workers;

pub use config::{Config, DemandParams, OrderMixSegment, Stations};
pub use decider::{AgentError, Decider};
pub use engine::{
    DiscardTrace, EpisodeMetrics, EpisodeResult, Simulator, TraceRecord, TraceSink, TurnPhase,
};
pub use error::{ConfigError, SimError};
pub use tools::{Action, AgentTraceEntry, AssignmentRequest, ToolExecutor, ToolResult};
pub use types::{format_time, Observation, Order, State, TurnSummary};
pub use workers::{EmployeeAssignment, Task, WorkerCapacities, WorkerId};
