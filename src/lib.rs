//! week-planner
//!
//! Weekly field-service planning: customers are grouped into geographic
//! clusters, clusters are placed on (weekday, team) slots, each team-day is
//! sequenced into a depot-to-depot route, overloaded team-days are
//! rebalanced, and anyone still unvisited is forced onto spare capacity.
//!
//! The entry point is [`plan_week`]. Travel costs come from any
//! [`TravelCosts`] implementation, usually a precomputed [`TravelMatrix`].

pub mod assign;
pub mod cluster;
pub mod config;
pub mod coverage;
pub mod error;
pub mod exact;
pub mod feasibility;
pub mod input;
pub mod matrix;
pub mod model;
pub mod pipeline;
pub mod rebalance;
pub mod report;
pub mod sequence;
pub mod tour;
pub mod traits;

pub use config::{AssignmentStrategy, PlannerConfig};
pub use error::{PlannerError, Result};
pub use matrix::TravelMatrix;
pub use model::{Assignment, Customer, SlotKey, TeamDay, WeekdaySet, WeeklySchedule};
pub use pipeline::{WeeklyPlan, plan_week};
pub use traits::{SlotAssigner, TravelCosts};
