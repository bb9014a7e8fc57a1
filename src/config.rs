//! Run configuration.
//!
//! Every threshold the engine uses lives here under a name. The defaults are
//! the values the franchise scheduler has been operating with: an 08:30 to
//! 18:30 window, a 600-minute team-day, 300-minute clusters and a 25-minute
//! per-stop travel allowance.

use std::time::Duration;

use serde::Deserialize;

use crate::model::Minutes;

/// How clusters are placed on team-days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    /// Greedy minimum marginal travel impact.
    #[default]
    Heuristic,
    /// Branch-and-bound over binary cluster/slot variables, with the
    /// heuristic as fallback on timeout or failure.
    Exact,
}

/// Objective weights of the exact assigner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExactWeights {
    /// Reward per customer covered.
    pub coverage: i64,
    /// Penalty per percentage point of inefficiency.
    pub efficiency: i64,
    /// Penalty per minute of cluster travel.
    pub travel: i64,
}

impl Default for ExactWeights {
    fn default() -> Self {
        Self {
            coverage: 1000,
            efficiency: 10,
            travel: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Operating window open, minutes from midnight.
    pub window_open: Minutes,
    /// Operating window close, minutes from midnight.
    pub window_close: Minutes,
    /// Hard cap on one team-day's cumulative service plus travel.
    pub team_day_cap: Minutes,
    /// Flat travel allowance per stop used by workload accounting.
    pub travel_allowance: Minutes,

    /// Per-customer travel overhead used while growing clusters.
    pub cluster_travel_overhead: Minutes,
    /// Cap on a cluster's aggregate service plus overhead.
    pub cluster_capacity_cap: Minutes,
    /// Load above which a cluster's marginal cost is penalised.
    pub cluster_soft_threshold: Minutes,
    pub cluster_pressure_penalty: f64,
    /// Day length used to estimate customers per cluster.
    pub cluster_reference_minutes: Minutes,
    pub customers_per_cluster_min: usize,
    pub customers_per_cluster_max: usize,
    pub cluster_count_min: usize,
    pub cluster_count_max: usize,
    pub cluster_growth_passes: usize,

    pub strategy: AssignmentStrategy,
    pub exact_time_budget_ms: u64,
    pub exact_max_clusters_per_slot: usize,
    pub exact_weights: ExactWeights,
    /// Search nodes explored between checks of the exact assigner's deadline.
    pub exact_deadline_check_nodes: u64,

    /// Wall-clock budget of the route solver, per team-day.
    pub route_time_budget_ms: u64,
    pub route_local_search_iterations: usize,
    /// Minutes the return-to-depot leg may run past `window_close`.
    pub route_return_slack: Minutes,
    pub parallel_sequencing: bool,

    pub rebalance_passes: usize,
    pub rebalance_moves_per_slot: usize,
    /// Overloaded team-days shed load until below `cap - margin`.
    pub rebalance_safety_margin: Minutes,

    /// Team-days with less spare than this are ignored when forcing coverage.
    pub coverage_min_spare: Minutes,

    /// Service duration used when a customer record is missing or invalid.
    pub default_service_minutes: Minutes,
    /// Longest service duration accepted from input tables.
    pub max_service_minutes: Minutes,
    /// Availability fractions at or below this produce no team-day.
    pub min_team_availability: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            window_open: 510,
            window_close: 1110,
            team_day_cap: 600,
            travel_allowance: 25,

            cluster_travel_overhead: 35,
            cluster_capacity_cap: 300,
            cluster_soft_threshold: 250,
            cluster_pressure_penalty: 1.3,
            cluster_reference_minutes: 570,
            customers_per_cluster_min: 2,
            customers_per_cluster_max: 4,
            cluster_count_min: 35,
            cluster_count_max: 60,
            cluster_growth_passes: 10,

            strategy: AssignmentStrategy::Heuristic,
            exact_time_budget_ms: 60_000,
            exact_max_clusters_per_slot: 2,
            exact_weights: ExactWeights::default(),
            exact_deadline_check_nodes: 1024,

            route_time_budget_ms: 2_000,
            route_local_search_iterations: 100,
            route_return_slack: 60,
            parallel_sequencing: true,

            rebalance_passes: 3,
            rebalance_moves_per_slot: 2,
            rebalance_safety_margin: 50,

            coverage_min_spare: 0,

            default_service_minutes: 90,
            max_service_minutes: 480,
            min_team_availability: 0.1,
        }
    }
}

impl PlannerConfig {
    /// Length of the operating window in minutes.
    pub fn operating_minutes(&self) -> Minutes {
        self.window_close - self.window_open
    }

    pub fn exact_time_budget(&self) -> Duration {
        Duration::from_millis(self.exact_time_budget_ms)
    }

    pub fn route_time_budget(&self) -> Duration {
        Duration::from_millis(self.route_time_budget_ms)
    }

    /// Minutes one stop contributes to a team-day's workload.
    pub fn stop_workload(&self, service_minutes: Minutes) -> Minutes {
        service_minutes + self.travel_allowance
    }
}
