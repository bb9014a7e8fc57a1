//! Slot assignment: workload ledger, heuristic assigner, and the
//! single-customer fallback pass.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::PlannerConfig;
use crate::feasibility::{FeasibilityTable, PlanContext};
use crate::model::{Assignment, Cluster, Minutes, SlotKey, WeeklySchedule};
use crate::tour::marginal_round_trip;
use crate::traits::{SlotAssigner, TravelCosts};

/// Committed workload per team-day.
///
/// Every known team-day has an entry from construction on, starting at zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkloadLedger {
    minutes: BTreeMap<SlotKey, Minutes>,
}

impl WorkloadLedger {
    pub fn new(table: &FeasibilityTable) -> Self {
        Self {
            minutes: table.slots().map(|slot| (slot, 0)).collect(),
        }
    }

    /// Ledger of Σ(service + travel allowance) per team-day of a schedule.
    pub fn from_schedule(table: &FeasibilityTable, schedule: &WeeklySchedule, config: &PlannerConfig) -> Self {
        let mut ledger = Self::new(table);
        for assignment in schedule.iter() {
            ledger.add(assignment.slot(), config.stop_workload(assignment.service_minutes));
        }
        ledger
    }

    pub fn get(&self, slot: SlotKey) -> Minutes {
        self.minutes.get(&slot).copied().unwrap_or(0)
    }

    pub fn add(&mut self, slot: SlotKey, minutes: Minutes) {
        *self.minutes.entry(slot).or_insert(0) += minutes;
    }

    pub fn subtract(&mut self, slot: SlotKey, minutes: Minutes) {
        *self.minutes.entry(slot).or_insert(0) -= minutes;
    }

    /// Remaining capacity of a team-day under the table's effective cap.
    pub fn spare(&self, table: &FeasibilityTable, slot: SlotKey) -> Minutes {
        table.cap(slot) - self.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, Minutes)> + '_ {
        self.minutes.iter().map(|(slot, minutes)| (*slot, *minutes))
    }
}

/// Mutable state handed from phase to phase.
#[derive(Debug, Clone, Default)]
pub struct PlanState {
    pub ledger: WorkloadLedger,
    pub schedule: WeeklySchedule,
}

impl PlanState {
    pub fn new(table: &FeasibilityTable) -> Self {
        Self {
            ledger: WorkloadLedger::new(table),
            schedule: WeeklySchedule::new(),
        }
    }

    /// Appends provisional assignments for the cluster's members in route
    /// order and charges the cluster's service plus travel to the slot.
    pub fn commit_cluster<M: TravelCosts>(&mut self, cluster: &Cluster, slot: SlotKey, ctx: &PlanContext<'_, M>) {
        for id in &cluster.route {
            if let Some(customer) = ctx.customer(id) {
                self.schedule.push(Assignment::provisional(customer, slot));
            }
        }
        self.ledger.add(slot, cluster.total_minutes());
    }
}

/// How the cluster batch was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// Minimum marginal travel, one cluster at a time.
    Greedy,
    /// Exact search completed within its budget.
    Optimal,
    /// Exact search hit its budget; best placement found was kept.
    Feasible,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignSummary {
    pub assigner: &'static str,
    pub status: SolveStatus,
    /// Ids of clusters placed on a team-day.
    pub committed: Vec<usize>,
    /// Ids of clusters left for the single-customer pass.
    pub uncommitted: Vec<usize>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssignError {
    #[error("no cluster passes the availability and capacity prefilter")]
    EmptyModel,
    #[error("no placement found within {0:?}")]
    NoSolution(Duration),
}

/// Places each cluster, in the order given, on the feasible team-day where it
/// adds the least round-trip travel.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAssigner;

impl SlotAssigner for HeuristicAssigner {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn assign<M: TravelCosts>(
        &self,
        clusters: &[Cluster],
        ctx: &PlanContext<'_, M>,
        state: &mut PlanState,
    ) -> Result<AssignSummary, AssignError> {
        let mut committed = Vec::new();
        let mut uncommitted = Vec::new();

        for cluster in clusters {
            let added = ctx.locations(cluster.members.iter().map(String::as_str));
            let workload = cluster.total_minutes();

            let mut best: Option<(SlotKey, Minutes)> = None;
            for day in cluster.common_days.iter() {
                for slot in ctx.table.teams_on(day) {
                    if state.ledger.get(slot) + workload > ctx.cap(slot) {
                        continue;
                    }
                    let existing = ctx.locations(state.schedule.slot_customer_ids(slot));
                    let marginal = marginal_round_trip(ctx.matrix, &existing, &added);
                    if best.is_none_or(|(_, best_marginal)| marginal < best_marginal) {
                        best = Some((slot, marginal));
                    }
                }
            }

            match best {
                Some((slot, marginal)) => {
                    debug!(cluster = cluster.id, day = ?slot.day, team = slot.team, marginal, "cluster committed");
                    state.commit_cluster(cluster, slot, ctx);
                    committed.push(cluster.id);
                }
                None => {
                    debug!(cluster = cluster.id, size = cluster.size(), "no team-day fits cluster");
                    uncommitted.push(cluster.id);
                }
            }
        }

        info!(
            committed = committed.len(),
            uncommitted = uncommitted.len(),
            "heuristic assignment finished"
        );
        Ok(AssignSummary {
            assigner: self.name(),
            status: SolveStatus::Greedy,
            committed,
            uncommitted,
        })
    }
}

/// Places customers one at a time on the feasible team-day with the least
/// marginal travel, charging service plus the per-stop allowance. Returns
/// the ids that found no team-day.
pub fn assign_individuals<M: TravelCosts>(ids: &[String], ctx: &PlanContext<'_, M>, state: &mut PlanState) -> Vec<String> {
    let mut unplaced = Vec::new();

    for id in ids {
        let Some(customer) = ctx.customer(id) else {
            warn!(customer = %id, "unknown customer skipped by fallback assignment");
            continue;
        };
        if state.schedule.contains_customer(id) {
            continue;
        }
        let workload = ctx.config.stop_workload(customer.service_minutes);
        let added = [customer.location.as_str()];

        let mut best: Option<(SlotKey, Minutes)> = None;
        for &slot in ctx.table.slots_for(id) {
            if state.ledger.get(slot) + workload > ctx.cap(slot) {
                continue;
            }
            let existing = ctx.locations(state.schedule.slot_customer_ids(slot));
            let marginal = marginal_round_trip(ctx.matrix, &existing, &added);
            if best.is_none_or(|(_, best_marginal)| marginal < best_marginal) {
                best = Some((slot, marginal));
            }
        }

        match best {
            Some((slot, marginal)) => {
                debug!(customer = %id, day = ?slot.day, team = slot.team, marginal, "customer placed individually");
                state.schedule.push(Assignment::provisional(customer, slot));
                state.ledger.add(slot, workload);
            }
            None => unplaced.push(id.clone()),
        }
    }

    if !unplaced.is_empty() {
        info!(unplaced = unplaced.len(), "customers left for coverage enforcement");
    }
    unplaced
}
