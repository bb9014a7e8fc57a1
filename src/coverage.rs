//! Coverage enforcer.
//!
//! Places every customer that still has no visit on the team-day with the
//! most spare capacity among those it may use. A placement is only kept if
//! the re-sequenced route still holds every visit it had, otherwise the
//! team-day with the next-most spare is tried. Whoever is left after that is
//! reported by id.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::assign::{PlanState, WorkloadLedger};
use crate::feasibility::PlanContext;
use crate::model::{Minutes, SlotKey};
use crate::sequence::{SequencedRoute, sequence_with};
use crate::traits::TravelCosts;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForcedPlacement {
    pub customer_id: String,
    pub slot: SlotKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub placed: Vec<ForcedPlacement>,
    /// Customers without a visit after enforcement, in input order.
    pub uncovered: Vec<String>,
}

impl CoverageReport {
    pub fn is_complete(&self) -> bool {
        self.uncovered.is_empty()
    }
}

pub fn enforce_coverage<M>(
    state: &mut PlanState,
    routes: &mut BTreeMap<SlotKey, SequencedRoute>,
    ctx: &PlanContext<'_, M>,
) -> CoverageReport
where
    M: TravelCosts + Sync,
{
    let config = ctx.config;
    state.ledger = WorkloadLedger::from_schedule(ctx.table, &state.schedule, config);

    let missing: Vec<&str> = uncovered_ids(state, ctx);
    let mut report = CoverageReport::default();

    for id in missing {
        let Some(customer) = ctx.customer(id) else {
            continue;
        };
        let workload = config.stop_workload(customer.service_minutes);
        let needed = workload.max(config.coverage_min_spare);

        let mut candidates: Vec<(SlotKey, Minutes)> = ctx
            .table
            .slots_for(id)
            .iter()
            .map(|&slot| (slot, state.ledger.spare(ctx.table, slot)))
            .filter(|&(_, spare)| spare >= needed)
            .collect();
        // Most spare first, ties in slot order.
        candidates.sort_by(|a, b| b.1.cmp(&a.1));

        for (slot, spare) in candidates {
            let Some(route) = sequence_with(slot, customer, &state.schedule, ctx) else {
                debug!(customer = %id, day = ?slot.day, team = slot.team, "placement would drop a visit, trying next team-day");
                continue;
            };
            debug!(customer = %id, day = ?slot.day, team = slot.team, spare, "coverage placement");
            state.schedule.replace_slot(slot, route.visits.clone());
            state.ledger.add(slot, workload);
            routes.insert(slot, route);
            report.placed.push(ForcedPlacement {
                customer_id: id.to_string(),
                slot,
            });
            break;
        }
    }

    state.ledger = WorkloadLedger::from_schedule(ctx.table, &state.schedule, config);

    report.uncovered = uncovered_ids(state, ctx).into_iter().map(str::to_string).collect();
    if report.uncovered.is_empty() {
        info!(placed = report.placed.len(), "all customers covered");
    } else {
        error!(
            uncovered = report.uncovered.len(),
            customers = ?report.uncovered,
            "customers left without a visit"
        );
    }
    report
}

fn uncovered_ids<'c, M: TravelCosts>(state: &PlanState, ctx: &PlanContext<'c, M>) -> Vec<&'c str> {
    let assigned = state.schedule.assigned_ids();
    ctx.table
        .customers()
        .iter()
        .map(|customer| customer.id.as_str())
        .filter(|id| !assigned.contains(id))
        .collect()
}
