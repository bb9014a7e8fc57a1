//! Seams of the planner.
//!
//! The travel matrix is consumed through [`TravelCosts`] so any precomputed
//! table can back a run. Slot assignment is one interface with two
//! implementations, chosen by configuration.

use crate::assign::{AssignError, AssignSummary, PlanState};
use crate::feasibility::PlanContext;
use crate::model::{Cluster, Minutes};

/// Read-only directed travel costs between location keys.
///
/// Implementations must return `0` for `time(x, x)` and fall back to a
/// documented default for unknown pairs rather than failing.
pub trait TravelCosts {
    /// Location key of the depot every route starts and ends at.
    fn depot(&self) -> &str;

    /// Travel time in minutes.
    fn time(&self, from: &str, to: &str) -> Minutes;

    /// Travel distance in kilometers.
    fn distance_km(&self, from: &str, to: &str) -> f64;

    /// Whether the table has any entry for this location.
    fn has_location(&self, key: &str) -> bool;

    /// Whether `time(from, to)` comes from the table rather than the default.
    fn has_entry(&self, from: &str, to: &str) -> bool {
        from == to || (self.has_location(from) && self.has_location(to))
    }
}

/// Assigns clusters to (weekday, team) slots.
///
/// On success the implementation has committed its placements into `state`.
/// On error `state` must be left exactly as it was received, so the caller
/// can hand the whole batch to another implementation.
pub trait SlotAssigner {
    fn name(&self) -> &'static str;

    fn assign<M: TravelCosts>(
        &self,
        clusters: &[Cluster],
        ctx: &PlanContext<'_, M>,
        state: &mut PlanState,
    ) -> Result<AssignSummary, AssignError>;
}
