//! Exact slot assigner.
//!
//! Every (cluster, team-day) pair that passes the availability and capacity
//! prefilter is a binary decision. The search picks at most one pair per
//! cluster, keeps each team-day under its spare capacity and under a fixed
//! number of clusters, and maximises
//!
//! ```text
//! Σ  size * coverage  -  (100 - efficiency%) * efficiency  -  travel * travel_weight
//! ```
//!
//! over the chosen clusters. Branch-and-bound runs depth-first under a
//! wall-clock budget. If the budget runs out, the best placement found so far
//! is accepted as long as it places at least one cluster.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::assign::{AssignError, AssignSummary, PlanState, SolveStatus};
use crate::config::ExactWeights;
use crate::feasibility::PlanContext;
use crate::model::{Cluster, Minutes, SlotKey};
use crate::traits::{SlotAssigner, TravelCosts};

/// Nodes explored between deadline checks unless configured otherwise.
pub const DEADLINE_CHECK_INTERVAL: u64 = 1024;

#[derive(Debug, Clone)]
pub struct ExactAssigner {
    pub time_budget: Duration,
    pub max_clusters_per_slot: usize,
    pub weights: ExactWeights,
    /// Nodes explored between deadline checks.
    pub check_interval: u64,
}

impl ExactAssigner {
    pub fn new(time_budget: Duration, max_clusters_per_slot: usize, weights: ExactWeights) -> Self {
        Self {
            time_budget,
            max_clusters_per_slot,
            weights,
            check_interval: DEADLINE_CHECK_INTERVAL,
        }
    }

    pub fn check_interval(mut self, nodes: u64) -> Self {
        self.check_interval = nodes.max(1);
        self
    }

    /// Objective contribution of placing a cluster.
    pub fn cluster_value(&self, cluster: &Cluster) -> i64 {
        let inefficiency = ((100.0 - cluster.efficiency_pct()) * self.weights.efficiency as f64).round() as i64;
        cluster.size() as i64 * self.weights.coverage - inefficiency - cluster.travel_minutes as i64 * self.weights.travel
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    cluster: usize,
    value: i64,
    workload: Minutes,
    slots: Vec<usize>,
}

struct Search<'s> {
    candidates: &'s [Candidate],
    /// Optimistic value of candidates `i..`.
    suffix_bound: Vec<i64>,
    spare: Vec<Minutes>,
    count: Vec<usize>,
    max_per_slot: usize,
    current: Vec<Option<usize>>,
    current_value: i64,
    best: Vec<Option<usize>>,
    best_value: i64,
    deadline: Instant,
    check_interval: u64,
    nodes: u64,
    timed_out: bool,
}

impl Search<'_> {
    fn run(&mut self, depth: usize) {
        self.nodes += 1;
        if self.nodes % self.check_interval == 0 && Instant::now() >= self.deadline {
            self.timed_out = true;
        }
        if self.timed_out {
            return;
        }

        if self.current_value > self.best_value {
            self.best_value = self.current_value;
            self.best.clone_from(&self.current);
        }
        if depth == self.candidates.len() {
            return;
        }
        if self.current_value + self.suffix_bound[depth] <= self.best_value {
            return;
        }

        let candidates = self.candidates;
        let candidate = &candidates[depth];
        if candidate.value > 0 {
            for &slot in &candidate.slots {
                if self.count[slot] >= self.max_per_slot || self.spare[slot] < candidate.workload {
                    continue;
                }
                self.spare[slot] -= candidate.workload;
                self.count[slot] += 1;
                self.current[depth] = Some(slot);
                self.current_value += candidate.value;

                self.run(depth + 1);

                self.current_value -= candidate.value;
                self.current[depth] = None;
                self.count[slot] -= 1;
                self.spare[slot] += candidate.workload;

                if self.timed_out {
                    return;
                }
            }
        }

        self.run(depth + 1);
    }
}

impl SlotAssigner for ExactAssigner {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn assign<M: TravelCosts>(
        &self,
        clusters: &[Cluster],
        ctx: &PlanContext<'_, M>,
        state: &mut PlanState,
    ) -> Result<AssignSummary, AssignError> {
        let started = Instant::now();
        if clusters.is_empty() {
            return Ok(AssignSummary {
                assigner: self.name(),
                status: SolveStatus::Optimal,
                committed: Vec::new(),
                uncommitted: Vec::new(),
            });
        }

        let slots: Vec<SlotKey> = ctx.table.slots().collect();
        let slot_index: BTreeMap<SlotKey, usize> = slots.iter().enumerate().map(|(i, s)| (*s, i)).collect();
        let spare: Vec<Minutes> = slots.iter().map(|&slot| state.ledger.spare(ctx.table, slot)).collect();

        let mut candidates: Vec<Candidate> = clusters
            .iter()
            .enumerate()
            .filter_map(|(cluster, c)| {
                let workload = c.total_minutes();
                let feasible: Vec<usize> = c
                    .common_days
                    .iter()
                    .flat_map(|day| ctx.table.teams_on(day))
                    .filter_map(|slot| slot_index.get(&slot).copied())
                    .filter(|&idx| workload <= spare[idx])
                    .collect();
                (!feasible.is_empty()).then(|| Candidate {
                    cluster,
                    value: self.cluster_value(c),
                    workload,
                    slots: feasible,
                })
            })
            .collect();

        let variables: usize = candidates.iter().map(|c| c.slots.len()).sum();
        if variables == 0 {
            return Err(AssignError::EmptyModel);
        }
        candidates.sort_by(|a, b| b.value.cmp(&a.value).then(a.cluster.cmp(&b.cluster)));

        let mut suffix_bound = vec![0i64; candidates.len() + 1];
        for i in (0..candidates.len()).rev() {
            suffix_bound[i] = suffix_bound[i + 1] + candidates[i].value.max(0);
        }

        let mut search = Search {
            candidates: &candidates,
            suffix_bound,
            spare,
            count: vec![0; slots.len()],
            max_per_slot: self.max_clusters_per_slot,
            current: vec![None; candidates.len()],
            current_value: 0,
            best: vec![None; candidates.len()],
            best_value: 0,
            deadline: started + self.time_budget,
            check_interval: self.check_interval.max(1),
            nodes: 0,
            timed_out: false,
        };
        search.run(0);

        let chosen: Vec<(usize, SlotKey)> = search
            .best
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|s| (candidates[i].cluster, slots[s])))
            .collect();

        debug!(
            variables,
            nodes = search.nodes,
            objective = search.best_value,
            timed_out = search.timed_out,
            "exact search finished"
        );

        let status = if !search.timed_out {
            SolveStatus::Optimal
        } else if !chosen.is_empty() {
            SolveStatus::Feasible
        } else {
            return Err(AssignError::NoSolution(self.time_budget));
        };

        let mut placement: Vec<Option<SlotKey>> = vec![None; clusters.len()];
        for (cluster, slot) in chosen {
            placement[cluster] = Some(slot);
        }

        let mut committed = Vec::new();
        let mut uncommitted = Vec::new();
        for (cluster, slot) in clusters.iter().zip(placement) {
            match slot {
                Some(slot) => {
                    state.commit_cluster(cluster, slot, ctx);
                    committed.push(cluster.id);
                }
                None => uncommitted.push(cluster.id),
            }
        }

        info!(
            status = ?status,
            committed = committed.len(),
            uncommitted = uncommitted.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "exact assignment finished"
        );
        Ok(AssignSummary {
            assigner: self.name(),
            status,
            committed,
            uncommitted,
        })
    }
}
