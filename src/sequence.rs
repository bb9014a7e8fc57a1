//! Route sequencer.
//!
//! Orders one team-day's committed customers into a depot-to-depot route.
//! The solver builds a route by cheapest insertion and improves it with
//! 2-opt and relocate moves, checking the operating window and the team-day
//! cap on every candidate. When the solver runs out of time or cannot route
//! anyone, a nearest-neighbor walk that only respects the window takes over.
//! Customers that fit neither way are returned as dropped, never discarded.

use std::collections::BTreeSet;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::feasibility::PlanContext;
use crate::model::{Assignment, Customer, Minutes, SlotKey, WeeklySchedule};
use crate::traits::TravelCosts;

/// How a team-day's route was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStrategy {
    /// Zero or one customer, no search needed.
    Direct,
    /// Cheapest insertion followed by local search.
    Solver,
    /// Nearest-neighbor fallback after a solver failure.
    NearestNeighbor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequencedRoute {
    pub slot: SlotKey,
    /// Visits in driving order with final start and end times.
    pub visits: Vec<Assignment>,
    /// Customers removed from this team-day because they do not fit.
    pub dropped: Vec<String>,
    /// Depot-to-depot travel over `visits`.
    pub travel_minutes: Minutes,
    pub strategy: RouteStrategy,
}

impl SequencedRoute {
    pub fn customer_ids(&self) -> impl Iterator<Item = &str> {
        self.visits.iter().map(|visit| visit.customer_id.as_str())
    }
}

/// One team-day's routing problem. Node 0 is the depot, node `i + 1` is
/// `customers[i]`.
struct RouteProblem<'a> {
    customers: &'a [&'a Customer],
    matrix: Vec<Vec<Minutes>>,
    open: Minutes,
    close: Minutes,
    /// Latest arrival back at the depot.
    return_limit: Minutes,
    cap: Minutes,
}

impl<'a> RouteProblem<'a> {
    fn new<M: TravelCosts>(slot: SlotKey, customers: &'a [&'a Customer], ctx: &PlanContext<'_, M>) -> Self {
        let mut locations = Vec::with_capacity(customers.len() + 1);
        locations.push(ctx.matrix.depot());
        locations.extend(customers.iter().map(|customer| customer.location.as_str()));

        let matrix = locations
            .iter()
            .map(|from| locations.iter().map(|to| ctx.matrix.time(from, to)).collect())
            .collect();

        Self {
            customers,
            matrix,
            open: ctx.config.window_open,
            close: ctx.config.window_close,
            return_limit: ctx.config.window_close + ctx.config.route_return_slack,
            cap: ctx.cap(slot),
        }
    }

    fn travel(&self, from_node: usize, to_node: usize) -> Minutes {
        self.matrix[from_node][to_node]
    }

    fn service(&self, visit: usize) -> Minutes {
        self.customers[visit].service_minutes
    }
}

#[derive(Debug, Clone, Default)]
struct RouteState {
    visits: Vec<usize>,
    estimated_windows: Vec<(Minutes, Minutes)>,
    total_travel_time: Minutes,
}

enum RouteOutcome {
    Solved { route: RouteState, unrouted: Vec<usize> },
    DeadlineExceeded,
    NothingRouted,
}

/// Sequences one team-day.
pub fn sequence_team_day<M: TravelCosts>(slot: SlotKey, customers: &[&Customer], ctx: &PlanContext<'_, M>) -> SequencedRoute {
    let problem = RouteProblem::new(slot, customers, ctx);

    if customers.len() <= 1 {
        let (route, dropped) = nearest_neighbor_route(&problem);
        return finish(slot, &problem, route, dropped, RouteStrategy::Direct);
    }

    let deadline = Instant::now() + ctx.config.route_time_budget();
    match solve_route(&problem, deadline, ctx.config.route_local_search_iterations) {
        RouteOutcome::Solved { route, unrouted } => finish(slot, &problem, route, unrouted, RouteStrategy::Solver),
        failure => {
            let reason = match failure {
                RouteOutcome::DeadlineExceeded => "deadline exceeded",
                _ => "no customer routed",
            };
            warn!(day = ?slot.day, team = slot.team, customers = customers.len(), reason, "route solver failed, using nearest neighbor");
            let (route, dropped) = nearest_neighbor_route(&problem);
            finish(slot, &problem, route, dropped, RouteStrategy::NearestNeighbor)
        }
    }
}

/// Sequences the given team-days and writes the routes back into the
/// schedule. Dropped customers are no longer in the schedule afterwards.
///
/// Team-days are independent, so they are solved on the rayon pool when
/// `parallel_sequencing` is set. The schedule is only written once every
/// route is complete, in slot order.
pub fn sequence_slots<M>(slots: &BTreeSet<SlotKey>, schedule: &mut WeeklySchedule, ctx: &PlanContext<'_, M>) -> Vec<SequencedRoute>
where
    M: TravelCosts + Sync,
{
    let jobs: Vec<(SlotKey, Vec<&Customer>)> = slots
        .iter()
        .map(|&slot| {
            let customers = schedule
                .slot_customer_ids(slot)
                .into_iter()
                .filter_map(|id| ctx.customer(id))
                .collect();
            (slot, customers)
        })
        .collect();

    let routes: Vec<SequencedRoute> = if ctx.config.parallel_sequencing {
        jobs.par_iter()
            .map(|(slot, customers)| sequence_team_day(*slot, customers, ctx))
            .collect()
    } else {
        jobs.iter()
            .map(|(slot, customers)| sequence_team_day(*slot, customers, ctx))
            .collect()
    };

    for route in &routes {
        schedule.replace_slot(route.slot, route.visits.clone());
    }

    let fallbacks = routes
        .iter()
        .filter(|route| route.strategy == RouteStrategy::NearestNeighbor)
        .count();
    let dropped: usize = routes.iter().map(|route| route.dropped.len()).sum();
    info!(team_days = routes.len(), fallbacks, dropped, "team-days sequenced");

    routes
}

/// Sequences `slot` with `customer` added to the customers it already
/// holds. Returns the route only if every one of them, the newcomer
/// included, is routed; the schedule is not touched.
pub fn sequence_with<M: TravelCosts>(
    slot: SlotKey,
    customer: &Customer,
    schedule: &WeeklySchedule,
    ctx: &PlanContext<'_, M>,
) -> Option<SequencedRoute> {
    let mut customers: Vec<&Customer> = schedule
        .slot_customer_ids(slot)
        .into_iter()
        .filter_map(|id| ctx.customer(id))
        .collect();
    customers.push(customer);

    let route = sequence_team_day(slot, &customers, ctx);
    if route.dropped.is_empty() {
        Some(route)
    } else {
        debug!(day = ?slot.day, team = slot.team, customer = %customer.id, dropped = ?route.dropped, "trial route drops customers");
        None
    }
}

fn finish(
    slot: SlotKey,
    problem: &RouteProblem<'_>,
    route: RouteState,
    dropped: Vec<usize>,
    strategy: RouteStrategy,
) -> SequencedRoute {
    let visits = route
        .visits
        .iter()
        .zip(route.estimated_windows.iter())
        .map(|(&visit, &(start, end))| Assignment {
            customer_id: problem.customers[visit].id.clone(),
            day: slot.day,
            team: slot.team,
            start,
            end,
            service_minutes: problem.service(visit),
        })
        .collect();
    let dropped: Vec<String> = dropped
        .into_iter()
        .map(|visit| problem.customers[visit].id.clone())
        .collect();

    if !dropped.is_empty() {
        debug!(day = ?slot.day, team = slot.team, dropped = ?dropped, "customers dropped from route");
    }

    SequencedRoute {
        slot,
        visits,
        dropped,
        travel_minutes: route.total_travel_time,
        strategy,
    }
}

fn solve_route(problem: &RouteProblem<'_>, deadline: Instant, iterations: usize) -> RouteOutcome {
    let mut route = RouteState::default();
    let mut pending: Vec<usize> = (0..problem.customers.len()).collect();

    // Cheapest insertion: repeatedly insert the (customer, position) pair
    // giving the shortest feasible route.
    loop {
        if Instant::now() >= deadline {
            return RouteOutcome::DeadlineExceeded;
        }

        let mut best: Option<(usize, usize, Vec<(Minutes, Minutes)>, Minutes)> = None;
        for (pending_idx, &visit) in pending.iter().enumerate() {
            for position in 0..=route.visits.len() {
                let mut candidate = route.visits.clone();
                candidate.insert(position, visit);
                if let Some((windows, cost)) = compute_schedule(&candidate, problem) {
                    if best.as_ref().is_none_or(|(_, _, _, best_cost)| cost < *best_cost) {
                        best = Some((pending_idx, position, windows, cost));
                    }
                }
            }
        }

        let Some((pending_idx, position, windows, cost)) = best else {
            break;
        };
        let visit = pending.remove(pending_idx);
        route.visits.insert(position, visit);
        route.estimated_windows = windows;
        route.total_travel_time = cost;
        if pending.is_empty() {
            break;
        }
    }

    if route.visits.is_empty() {
        return RouteOutcome::NothingRouted;
    }

    local_search(&mut route, problem, deadline, iterations);

    let mut unrouted = Vec::new();
    for visit in pending {
        if !insert_cheapest(&mut route, visit, problem) {
            unrouted.push(visit);
        }
    }

    RouteOutcome::Solved { route, unrouted }
}

/// Start and end of every visit plus the route's total travel, or `None` if
/// the route breaks the window, the return limit or the cap.
fn compute_schedule(visits: &[usize], problem: &RouteProblem<'_>) -> Option<(Vec<(Minutes, Minutes)>, Minutes)> {
    let mut time = problem.open;
    let mut total_travel = 0;
    let mut workload = 0;
    let mut result_windows = Vec::with_capacity(visits.len());
    let mut prev_node = 0;

    for &visit in visits {
        let travel = problem.travel(prev_node, visit + 1);
        let start = time + travel;
        let end = start + problem.service(visit);
        if end > problem.close {
            return None;
        }

        total_travel += travel;
        workload += travel + problem.service(visit);
        result_windows.push((start, end));
        time = end;
        prev_node = visit + 1;
    }

    if !visits.is_empty() {
        let back = problem.travel(prev_node, 0);
        if time + back > problem.return_limit {
            return None;
        }
        total_travel += back;
        workload += back;
    }

    if workload > problem.cap {
        return None;
    }

    Some((result_windows, total_travel))
}

fn insert_cheapest(route: &mut RouteState, visit: usize, problem: &RouteProblem<'_>) -> bool {
    let mut best: Option<(usize, Vec<(Minutes, Minutes)>, Minutes)> = None;
    for position in 0..=route.visits.len() {
        let mut candidate = route.visits.clone();
        candidate.insert(position, visit);
        if let Some((windows, cost)) = compute_schedule(&candidate, problem) {
            if best.as_ref().is_none_or(|(_, _, best_cost)| cost < *best_cost) {
                best = Some((position, windows, cost));
            }
        }
    }

    match best {
        Some((position, windows, cost)) => {
            route.visits.insert(position, visit);
            route.estimated_windows = windows;
            route.total_travel_time = cost;
            true
        }
        None => false,
    }
}

/// Nearest-neighbor walk from the depot that only checks the operating
/// window. A customer that would finish after close is dropped and the walk
/// continues from the same place.
fn nearest_neighbor_route(problem: &RouteProblem<'_>) -> (RouteState, Vec<usize>) {
    let mut route = RouteState::default();
    let mut dropped = Vec::new();
    let mut remaining: Vec<usize> = (0..problem.customers.len()).collect();
    let mut time = problem.open;
    let mut prev_node = 0;

    while !remaining.is_empty() {
        let mut nearest = 0;
        for (idx, &visit) in remaining.iter().enumerate() {
            if problem.travel(prev_node, visit + 1) < problem.travel(prev_node, remaining[nearest] + 1) {
                nearest = idx;
            }
        }
        let visit = remaining.remove(nearest);

        let travel = problem.travel(prev_node, visit + 1);
        let start = time + travel;
        let end = start + problem.service(visit);
        if end > problem.close {
            dropped.push(visit);
            continue;
        }

        route.visits.push(visit);
        route.estimated_windows.push((start, end));
        route.total_travel_time += travel;
        time = end;
        prev_node = visit + 1;
    }

    if !route.visits.is_empty() {
        route.total_travel_time += problem.travel(prev_node, 0);
    }

    (route, dropped)
}

// ============================================================================
// Local Search Operators
// ============================================================================

/// 2-opt: reverse a segment of the route to reduce travel time.
/// Returns true if an improvement was made.
fn two_opt_improve(route: &mut RouteState, problem: &RouteProblem<'_>) -> bool {
    if route.visits.len() < 3 {
        return false;
    }

    let current_cost = route.total_travel_time;
    let n = route.visits.len();

    for i in 0..n - 1 {
        for j in i + 1..n {
            let mut candidate = route.visits.clone();
            candidate[i..=j].reverse();

            if let Some((windows, cost)) = compute_schedule(&candidate, problem) {
                if cost < current_cost {
                    route.visits = candidate;
                    route.estimated_windows = windows;
                    route.total_travel_time = cost;
                    return true;
                }
            }
        }
    }

    false
}

/// Relocate: move one visit to another position in the route.
/// Returns true if an improvement was made.
fn relocate_improve(route: &mut RouteState, problem: &RouteProblem<'_>) -> bool {
    let n = route.visits.len();
    if n < 2 {
        return false;
    }

    let current_cost = route.total_travel_time;
    for visit_idx in 0..n {
        let mut without = route.visits.clone();
        let visit = without.remove(visit_idx);

        for insert_pos in 0..n {
            if insert_pos == visit_idx {
                continue;
            }
            let mut candidate = without.clone();
            candidate.insert(insert_pos, visit);

            if let Some((windows, cost)) = compute_schedule(&candidate, problem) {
                if cost < current_cost {
                    route.visits = candidate;
                    route.estimated_windows = windows;
                    route.total_travel_time = cost;
                    return true;
                }
            }
        }
    }

    false
}

/// Run local search until no more improvements, the iteration bound, or the deadline.
fn local_search(route: &mut RouteState, problem: &RouteProblem<'_>, deadline: Instant, iterations: usize) {
    for _ in 0..iterations {
        if Instant::now() >= deadline {
            break;
        }

        let mut improved = false;
        if two_opt_improve(route, problem) {
            improved = true;
        }
        if relocate_improve(route, problem) {
            improved = true;
        }

        if !improved {
            break;
        }
    }
}
