//! Depot-anchored tour helpers.
//!
//! The clusterer, the slot assigner and the travel accountant all price a
//! set of stops the same way: a nearest-neighbor walk from the depot and back.

use crate::model::Minutes;
use crate::traits::TravelCosts;

/// Visiting order produced by always driving to the nearest unvisited stop,
/// starting at the depot. Returns indices into `locations`.
///
/// Ties go to the stop listed first.
pub fn nearest_neighbor_order<M: TravelCosts>(costs: &M, locations: &[&str]) -> Vec<usize> {
    let mut visited = vec![false; locations.len()];
    let mut order = Vec::with_capacity(locations.len());
    let mut current = costs.depot();

    for _ in 0..locations.len() {
        let mut best: Option<(usize, Minutes)> = None;
        for (idx, location) in locations.iter().enumerate() {
            if visited[idx] {
                continue;
            }
            let time = costs.time(current, location);
            if best.is_none_or(|(_, best_time)| time < best_time) {
                best = Some((idx, time));
            }
        }
        let Some((idx, _)) = best else { break };
        visited[idx] = true;
        order.push(idx);
        current = locations[idx];
    }

    order
}

/// Travel minutes of depot -> stops (in the given order) -> depot.
pub fn round_trip_minutes<M: TravelCosts>(costs: &M, ordered: &[&str]) -> Minutes {
    let depot = costs.depot();
    let mut total = 0;
    let mut previous = depot;
    for &location in ordered {
        total += costs.time(previous, location);
        previous = location;
    }
    if !ordered.is_empty() {
        total += costs.time(previous, depot);
    }
    total
}

/// Kilometers of depot -> stops (in the given order) -> depot.
pub fn round_trip_km<M: TravelCosts>(costs: &M, ordered: &[&str]) -> f64 {
    let depot = costs.depot();
    let mut total = 0.0;
    let mut previous = depot;
    for &location in ordered {
        total += costs.distance_km(previous, location);
        previous = location;
    }
    if !ordered.is_empty() {
        total += costs.distance_km(previous, depot);
    }
    total
}

/// Round-trip minutes of the nearest-neighbor tour over `locations`.
pub fn nearest_neighbor_round_trip<M: TravelCosts>(costs: &M, locations: &[&str]) -> Minutes {
    let order = nearest_neighbor_order(costs, locations);
    let ordered: Vec<&str> = order.into_iter().map(|idx| locations[idx]).collect();
    round_trip_minutes(costs, &ordered)
}

/// Increase in nearest-neighbor round-trip cost when `added` joins `existing`.
pub fn marginal_round_trip<M: TravelCosts>(costs: &M, existing: &[&str], added: &[&str]) -> Minutes {
    let before = nearest_neighbor_round_trip(costs, existing);
    let merged: Vec<&str> = existing.iter().chain(added.iter()).copied().collect();
    nearest_neighbor_round_trip(costs, &merged) - before
}
