//! Rebalancer.
//!
//! After sequencing, team-days whose Σ(service + allowance) is over the cap
//! shed their longest visits, and customers the sequencer dropped look for a
//! new team-day. Each pass re-sequences every team-day it touched, so a pass
//! can produce new drops for the next one. A relocation is trial-sequenced
//! on its destination first and only kept if no resident visit is dropped.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assign::{PlanState, WorkloadLedger};
use crate::feasibility::PlanContext;
use crate::model::{Assignment, Minutes, SlotKey};
use crate::sequence::{SequencedRoute, sequence_slots, sequence_with};
use crate::traits::TravelCosts;

/// A problem the engine could not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Team-day whose workload is still above its cap.
    Overload {
        slot: SlotKey,
        workload: Minutes,
        cap: Minutes,
    },
    /// Customer dropped by the sequencer and not placed anywhere since.
    Unplaced { customer_id: String, from: SlotKey },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relocation {
    pub customer_id: String,
    pub from: SlotKey,
    pub to: SlotKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebalanceReport {
    pub passes: usize,
    pub relocations: Vec<Relocation>,
    /// Customers put back on their original team-day for lack of an alternative.
    pub reinstated: Vec<String>,
    /// Every customer the sequencer dropped, with the team-day it was dropped from.
    pub dropped: BTreeMap<String, SlotKey>,
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone)]
struct PendingMove {
    customer_id: String,
    origin: SlotKey,
    from_overload: bool,
}

/// Runs up to `rebalance_passes` passes. `routes` holds the latest route of
/// every sequenced team-day and is updated as team-days are re-sequenced.
pub fn rebalance<M>(
    state: &mut PlanState,
    routes: &mut BTreeMap<SlotKey, SequencedRoute>,
    ctx: &PlanContext<'_, M>,
) -> RebalanceReport
where
    M: TravelCosts + Sync,
{
    let config = ctx.config;
    let mut report = RebalanceReport::default();
    let mut pending: Vec<(String, SlotKey)> = routes
        .values()
        .flat_map(|route| route.dropped.iter().map(move |id| (id.clone(), route.slot)))
        .collect();
    for (id, slot) in &pending {
        report.dropped.insert(id.clone(), *slot);
    }

    for pass in 0..config.rebalance_passes {
        state.ledger = WorkloadLedger::from_schedule(ctx.table, &state.schedule, config);
        let overloaded: Vec<SlotKey> = state
            .ledger
            .iter()
            .filter(|&(slot, workload)| workload > ctx.cap(slot))
            .map(|(slot, _)| slot)
            .collect();

        if overloaded.is_empty() && pending.is_empty() {
            debug!(pass, "no violations left");
            break;
        }
        report.passes += 1;

        let mut changed: BTreeSet<SlotKey> = BTreeSet::new();
        let mut moves: Vec<PendingMove> = Vec::new();

        for slot in overloaded {
            let target = ctx.cap(slot) - config.rebalance_safety_margin;
            let mut candidates: Vec<Assignment> = state.schedule.slot_assignments(slot).into_iter().cloned().collect();
            candidates.sort_by(|a, b| b.service_minutes.cmp(&a.service_minutes));

            for assignment in candidates.into_iter().take(config.rebalance_moves_per_slot) {
                if state.ledger.get(slot) <= target {
                    break;
                }
                state.schedule.remove_customer(&assignment.customer_id);
                state.ledger.subtract(slot, config.stop_workload(assignment.service_minutes));
                changed.insert(slot);
                moves.push(PendingMove {
                    customer_id: assignment.customer_id,
                    origin: slot,
                    from_overload: true,
                });
            }
            debug!(day = ?slot.day, team = slot.team, workload = state.ledger.get(slot), "overloaded team-day shed load");
        }

        moves.extend(pending.drain(..).map(|(customer_id, origin)| PendingMove {
            customer_id,
            origin,
            from_overload: false,
        }));

        for pending_move in moves {
            let Some(customer) = ctx.customer(&pending_move.customer_id) else {
                continue;
            };
            if state.schedule.contains_customer(&customer.id) {
                continue;
            }
            let workload = config.stop_workload(customer.service_minutes);
            let origin = pending_move.origin;

            let fits = |slot: SlotKey| {
                slot != origin && state.ledger.get(slot) + workload <= ctx.cap(slot) - config.rebalance_safety_margin
            };
            // Other days first, then other teams on the same day, least loaded first within each.
            let mut candidates: Vec<SlotKey> = ctx
                .table
                .slots_for(&customer.id)
                .iter()
                .copied()
                .filter(|&slot| fits(slot))
                .collect();
            candidates.sort_by_key(|slot| (slot.day == origin.day, state.ledger.get(*slot)));

            // A relocation is only kept if the destination route still holds every visit it had.
            let target = candidates.into_iter().find_map(|slot| {
                let route = sequence_with(slot, customer, &state.schedule, ctx);
                if route.is_none() {
                    debug!(customer = %customer.id, to = %slot, "relocation would drop a visit, trying next team-day");
                }
                route
            });
            match target {
                Some(route) => {
                    let slot = route.slot;
                    debug!(customer = %customer.id, from = %origin, to = %slot, "customer relocated");
                    state.schedule.replace_slot(slot, route.visits.clone());
                    state.ledger.add(slot, workload);
                    changed.remove(&slot);
                    routes.insert(slot, route);
                    report.relocations.push(Relocation {
                        customer_id: customer.id.clone(),
                        from: origin,
                        to: slot,
                    });
                }
                None if pending_move.from_overload => {
                    debug!(customer = %customer.id, slot = %origin, "no alternative, reinstated");
                    state.schedule.push(Assignment::provisional(customer, origin));
                    state.ledger.add(origin, workload);
                    changed.insert(origin);
                    report.reinstated.push(customer.id.clone());
                }
                None => {
                    debug!(customer = %customer.id, from = %origin, "no alternative for dropped customer");
                }
            }
        }

        for route in sequence_slots(&changed, &mut state.schedule, ctx) {
            for id in &route.dropped {
                pending.push((id.clone(), route.slot));
                report.dropped.insert(id.clone(), route.slot);
            }
            routes.insert(route.slot, route);
        }
    }

    state.ledger = WorkloadLedger::from_schedule(ctx.table, &state.schedule, config);
    report.violations = unresolved_violations(state, &report.dropped, ctx);
    for violation in &report.violations {
        match violation {
            Violation::Overload { slot, workload, cap } => {
                warn!(day = ?slot.day, team = slot.team, workload, cap, "unresolved overload");
            }
            Violation::Unplaced { customer_id, from } => {
                warn!(customer = %customer_id, from = %from, "dropped customer not re-placed");
            }
        }
    }
    info!(
        passes = report.passes,
        relocations = report.relocations.len(),
        reinstated = report.reinstated.len(),
        violations = report.violations.len(),
        "rebalancing finished"
    );
    report
}

/// Team-days over their cap in the state's ledger, and dropped customers
/// that are not in the schedule.
pub fn unresolved_violations<M: TravelCosts>(
    state: &PlanState,
    dropped: &BTreeMap<String, SlotKey>,
    ctx: &PlanContext<'_, M>,
) -> Vec<Violation> {
    let mut violations: Vec<Violation> = state
        .ledger
        .iter()
        .filter(|&(slot, workload)| workload > ctx.cap(slot))
        .map(|(slot, workload)| Violation::Overload {
            slot,
            workload,
            cap: ctx.cap(slot),
        })
        .collect();

    violations.extend(
        dropped
            .iter()
            .filter(|(id, _)| !state.schedule.contains_customer(id))
            .map(|(id, slot)| Violation::Unplaced {
                customer_id: id.clone(),
                from: *slot,
            }),
    );
    violations
}
