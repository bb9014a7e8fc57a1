//! Weekly planning entry point.
//!
//! Runs the phases strictly in order, each on the completed output of the
//! previous one: feasibility, clustering, slot assignment, sequencing,
//! rebalancing, coverage enforcement and travel accounting.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::assign::{AssignSummary, HeuristicAssigner, PlanState, SolveStatus, assign_individuals};
use crate::cluster::build_clusters;
use crate::config::{AssignmentStrategy, PlannerConfig};
use crate::coverage::{CoverageReport, enforce_coverage};
use crate::error::Result;
use crate::exact::ExactAssigner;
use crate::feasibility::{CapacityCheck, FeasibilityTable, PlanContext};
use crate::model::{Cluster, Customer, Minutes, SlotKey, TeamDay, WeeklySchedule};
use crate::rebalance::{RebalanceReport, Violation, rebalance, unresolved_violations};
use crate::report::{ClusterSummary, TravelReport, account_travel, summarize_clusters};
use crate::sequence::{RouteStrategy, SequencedRoute, sequence_slots};
use crate::traits::{SlotAssigner, TravelCosts};

/// How one team-day's final route was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSummary {
    pub slot: SlotKey,
    pub strategy: RouteStrategy,
    pub visits: usize,
    pub travel_minutes: Minutes,
}

/// Everything a planning run produces.
#[derive(Debug, Clone, Serialize)]
pub struct WeeklyPlan {
    pub schedule: WeeklySchedule,
    pub report: TravelReport,
    pub capacity_check: CapacityCheck,
    pub clusters: Vec<ClusterSummary>,
    pub assignment: AssignSummary,
    pub routes: Vec<RouteSummary>,
    pub rebalance: RebalanceReport,
    pub coverage: CoverageReport,
    /// Problems left in the final schedule.
    pub violations: Vec<Violation>,
    /// Customers without a visit, in input order.
    pub uncovered: Vec<String>,
}

impl WeeklyPlan {
    /// Every customer is visited and no team-day is over its cap.
    pub fn is_complete(&self) -> bool {
        self.uncovered.is_empty() && self.violations.is_empty()
    }

    pub fn coverage_pct(&self) -> f64 {
        self.report.week.coverage_pct
    }
}

/// Plans one week.
///
/// Fails only when the input cannot describe a week at all: no team-days,
/// duplicate customer ids or a non-positive service duration. Everything
/// else, including more work than capacity, is reported in the plan.
pub fn plan_week<M>(customers: &[Customer], team_days: &[TeamDay], matrix: &M, config: &PlannerConfig) -> Result<WeeklyPlan>
where
    M: TravelCosts + Sync,
{
    let table = info_span!("feasibility").in_scope(|| -> Result<FeasibilityTable> {
        let table = FeasibilityTable::build(customers, team_days, config)?;
        table.report_missing_locations(matrix);
        table.report_missing_pairs(matrix);
        Ok(table)
    })?;

    let capacity_check = table.capacity_check(config);
    if capacity_check.is_feasible() {
        info!(
            required = capacity_check.required_minutes,
            available = capacity_check.available_minutes,
            "capacity check passed"
        );
    } else {
        warn!(
            required = capacity_check.required_minutes,
            available = capacity_check.available_minutes,
            shortfall = capacity_check.required_minutes - capacity_check.available_minutes,
            "required work exceeds team capacity, coverage will be partial"
        );
    }

    let ctx = PlanContext::new(&table, matrix, config);

    let clusters = info_span!("cluster").in_scope(|| build_clusters(table.customers(), matrix, config));

    let mut state = PlanState::new(&table);
    let assignment = info_span!("assign").in_scope(|| {
        let summary = assign_clusters(&clusters, &ctx, &mut state);
        let leftover: Vec<String> = table
            .customers()
            .iter()
            .filter(|customer| !state.schedule.contains_customer(&customer.id))
            .map(|customer| customer.id.clone())
            .collect();
        assign_individuals(&leftover, &ctx, &mut state);
        summary
    });

    let mut routes: BTreeMap<SlotKey, SequencedRoute> = info_span!("sequence").in_scope(|| {
        let occupied = state.schedule.occupied_slots();
        sequence_slots(&occupied, &mut state.schedule, &ctx)
            .into_iter()
            .map(|route| (route.slot, route))
            .collect()
    });

    let rebalance_report = info_span!("rebalance").in_scope(|| rebalance(&mut state, &mut routes, &ctx));
    let coverage = info_span!("coverage").in_scope(|| enforce_coverage(&mut state, &mut routes, &ctx));
    let violations = unresolved_violations(&state, &rebalance_report.dropped, &ctx);
    let report = info_span!("report").in_scope(|| account_travel(&state.schedule, &ctx));

    let routes = routes
        .into_values()
        .filter(|route| !route.visits.is_empty())
        .map(|route| RouteSummary {
            slot: route.slot,
            strategy: route.strategy,
            visits: route.visits.len(),
            travel_minutes: route.travel_minutes,
        })
        .collect();

    let plan = WeeklyPlan {
        schedule: state.schedule,
        report,
        capacity_check,
        clusters: summarize_clusters(&clusters, config.cluster_reference_minutes),
        assignment,
        routes,
        rebalance: rebalance_report,
        uncovered: coverage.uncovered.clone(),
        coverage,
        violations,
    };

    if plan.is_complete() {
        info!(visits = plan.schedule.len(), "week planned");
    } else {
        warn!(
            visits = plan.schedule.len(),
            uncovered = plan.uncovered.len(),
            violations = plan.violations.len(),
            "week planned with unresolved problems"
        );
    }
    Ok(plan)
}

/// Runs the configured assigner. An exact-search failure hands the whole
/// batch to the heuristic.
fn assign_clusters<M: TravelCosts>(clusters: &[Cluster], ctx: &PlanContext<'_, M>, state: &mut PlanState) -> AssignSummary {
    let heuristic = HeuristicAssigner;
    let result = match ctx.config.strategy {
        AssignmentStrategy::Heuristic => heuristic.assign(clusters, ctx, state),
        AssignmentStrategy::Exact => {
            let exact = ExactAssigner::new(
                ctx.config.exact_time_budget(),
                ctx.config.exact_max_clusters_per_slot,
                ctx.config.exact_weights,
            )
            .check_interval(ctx.config.exact_deadline_check_nodes);
            exact.assign(clusters, ctx, state).or_else(|err| {
                warn!(error = %err, "exact assignment failed, falling back to heuristic");
                heuristic.assign(clusters, ctx, state)
            })
        }
    };

    result.unwrap_or_else(|err| {
        warn!(error = %err, "cluster assignment failed, placing customers individually");
        AssignSummary {
            assigner: heuristic.name(),
            status: SolveStatus::Greedy,
            committed: Vec::new(),
            uncommitted: clusters.iter().map(|cluster| cluster.id).collect(),
        }
    })
}
