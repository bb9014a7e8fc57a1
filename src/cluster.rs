//! Geographic clusterer.
//!
//! Partitions the customer pool into small, capacity-bounded groups that are
//! cheap to drive as one loop from the depot. Seeds are chosen farthest-first
//! so clusters spread over the service area; remaining customers then join
//! whichever cluster their addition lengthens least.

use tracing::{debug, info};

use crate::config::PlannerConfig;
use crate::model::{Cluster, Customer, Minutes, WeekdaySet};
use crate::tour::{marginal_round_trip, nearest_neighbor_order, round_trip_minutes};
use crate::traits::TravelCosts;

#[derive(Debug, Clone)]
struct Growing {
    members: Vec<usize>,
    load: Minutes,
}

/// Number of clusters to seed for this customer pool.
pub fn target_cluster_count(customers: &[Customer], config: &PlannerConfig) -> usize {
    let n = customers.len();
    if n == 0 {
        return 0;
    }

    let total_service: i64 = customers.iter().map(|c| c.service_minutes as i64).sum();
    let avg_service = total_service as f64 / n as f64;
    let per_stop = avg_service + config.cluster_travel_overhead as f64;
    let per_cluster = if per_stop > 0.0 {
        (config.cluster_reference_minutes as f64 / per_stop).floor() as usize
    } else {
        config.customers_per_cluster_max
    };
    let per_cluster = per_cluster
        .clamp(config.customers_per_cluster_min, config.customers_per_cluster_max)
        .max(1);

    n.div_ceil(per_cluster)
        .clamp(config.cluster_count_min, config.cluster_count_max)
        .min(n)
        .max(1)
}

/// Partitions `customers` into clusters, ordered by ascending travel per customer.
///
/// Every customer lands in exactly one cluster. Identical inputs produce
/// identical clusters.
pub fn build_clusters<M: TravelCosts>(customers: &[Customer], matrix: &M, config: &PlannerConfig) -> Vec<Cluster> {
    if customers.is_empty() {
        return Vec::new();
    }

    let target = target_cluster_count(customers, config);
    let seeds = farthest_first_seeds(customers, matrix, target);
    let stop_load = |idx: usize| customers[idx].service_minutes + config.cluster_travel_overhead;

    let mut assigned = vec![false; customers.len()];
    let mut clusters: Vec<Growing> = seeds
        .iter()
        .map(|&seed| {
            assigned[seed] = true;
            Growing {
                members: vec![seed],
                load: stop_load(seed),
            }
        })
        .collect();

    for pass in 0..config.cluster_growth_passes {
        let mut moved = 0;
        for idx in 0..customers.len() {
            if assigned[idx] {
                continue;
            }
            let load = stop_load(idx);
            let location = customers[idx].location.as_str();

            let mut best: Option<(usize, f64)> = None;
            for (cluster_idx, cluster) in clusters.iter().enumerate() {
                if cluster.load + load > config.cluster_capacity_cap {
                    continue;
                }
                let members: Vec<&str> = cluster
                    .members
                    .iter()
                    .map(|&m| customers[m].location.as_str())
                    .collect();
                let mut cost = marginal_round_trip(matrix, &members, &[location]) as f64;
                if cluster.load > config.cluster_soft_threshold && cost > 0.0 {
                    cost *= config.cluster_pressure_penalty;
                }
                if best.is_none_or(|(_, best_cost)| cost < best_cost) {
                    best = Some((cluster_idx, cost));
                }
            }

            if let Some((cluster_idx, _)) = best {
                clusters[cluster_idx].members.push(idx);
                clusters[cluster_idx].load += load;
                assigned[idx] = true;
                moved += 1;
            }
        }
        debug!(pass, moved, "cluster growth pass");
        if moved == 0 {
            break;
        }
    }

    let mut residual = 0;
    for idx in 0..customers.len() {
        if assigned[idx] {
            continue;
        }
        let smallest = clusters
            .iter()
            .enumerate()
            .min_by_key(|(_, cluster)| cluster.members.len())
            .map(|(cluster_idx, _)| cluster_idx);
        if let Some(cluster_idx) = smallest {
            clusters[cluster_idx].members.push(idx);
            clusters[cluster_idx].load += stop_load(idx);
            assigned[idx] = true;
            residual += 1;
        }
    }

    let mut result: Vec<Cluster> = clusters
        .into_iter()
        .enumerate()
        .map(|(id, growing)| finish_cluster(id, &growing.members, customers, matrix))
        .collect();
    result.sort_by(|a, b| a.travel_per_customer().total_cmp(&b.travel_per_customer()));

    info!(
        clusters = result.len(),
        target,
        residual,
        customers = customers.len(),
        "clusters built"
    );
    result
}

/// Farthest-first seed selection. The first seed is the customer farthest
/// from the depot; each next seed maximises its distance to the nearest
/// chosen seed.
fn farthest_first_seeds<M: TravelCosts>(customers: &[Customer], matrix: &M, target: usize) -> Vec<usize> {
    let depot = matrix.depot();
    let mut seeds: Vec<usize> = Vec::with_capacity(target);
    let mut is_seed = vec![false; customers.len()];

    let mut first: Option<(usize, Minutes)> = None;
    for (idx, customer) in customers.iter().enumerate() {
        let time = matrix.time(depot, &customer.location);
        if first.is_none_or(|(_, best)| time > best) {
            first = Some((idx, time));
        }
    }
    let Some((first, _)) = first else {
        return seeds;
    };
    seeds.push(first);
    is_seed[first] = true;

    while seeds.len() < target {
        let mut best: Option<(usize, Minutes)> = None;
        for (idx, customer) in customers.iter().enumerate() {
            if is_seed[idx] {
                continue;
            }
            let nearest_seed = seeds
                .iter()
                .map(|&seed| matrix.time(&customers[seed].location, &customer.location))
                .min()
                .unwrap_or(Minutes::MAX);
            if best.is_none_or(|(_, best_time)| nearest_seed > best_time) {
                best = Some((idx, nearest_seed));
            }
        }
        match best {
            Some((idx, _)) => {
                seeds.push(idx);
                is_seed[idx] = true;
            }
            None => break,
        }
    }

    seeds
}

fn finish_cluster<M: TravelCosts>(id: usize, members: &[usize], customers: &[Customer], matrix: &M) -> Cluster {
    let locations: Vec<&str> = members.iter().map(|&m| customers[m].location.as_str()).collect();
    let order = nearest_neighbor_order(matrix, &locations);
    let ordered_locations: Vec<&str> = order.iter().map(|&i| locations[i]).collect();

    let common_days = members
        .iter()
        .fold(WeekdaySet::all(), |days, &m| days.intersection(&customers[m].available_days));

    Cluster {
        id,
        members: members.iter().map(|&m| customers[m].id.clone()).collect(),
        route: order.iter().map(|&i| customers[members[i]].id.clone()).collect(),
        service_minutes: members.iter().map(|&m| customers[m].service_minutes).sum(),
        travel_minutes: round_trip_minutes(matrix, &ordered_locations),
        common_days,
    }
}
