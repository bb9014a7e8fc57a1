//! Travel accountant.
//!
//! Replays every team-day's visiting order through the travel matrix and
//! aggregates the result per team-day, weekday, team, customer and week.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveTime, Weekday};
use serde::Serialize;
use tracing::info;

use crate::feasibility::PlanContext;
use crate::model::{Assignment, Cluster, Minutes, SlotKey, TeamId, WEEK, WeekdaySet, WeeklySchedule, clock_time};
use crate::tour::{round_trip_km, round_trip_minutes};
use crate::traits::TravelCosts;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamDayTravel {
    pub slot: SlotKey,
    pub customers: usize,
    pub service_minutes: Minutes,
    /// Depot-to-depot travel over the visiting order.
    pub travel_minutes: Minutes,
    pub travel_km: f64,
    /// Service plus per-stop allowance, as charged against the cap.
    pub workload_minutes: Minutes,
    pub cap_minutes: Minutes,
    pub first_start: Option<NaiveTime>,
    pub last_end: Option<NaiveTime>,
}

impl TeamDayTravel {
    pub fn utilisation_pct(&self) -> f64 {
        percentage(self.workload_minutes as f64, self.cap_minutes as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTravel {
    pub day: Weekday,
    pub teams: usize,
    pub customers: usize,
    pub travel_minutes: Minutes,
    pub travel_km: f64,
    pub avg_travel_per_team: f64,
    pub avg_travel_per_customer: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamTravel {
    pub team: TeamId,
    pub days_worked: usize,
    pub customers: usize,
    pub travel_minutes: Minutes,
    pub avg_travel_per_day: f64,
}

/// The leg driven to reach a customer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerTravel {
    pub customer_id: String,
    pub day: Weekday,
    pub team: TeamId,
    pub inbound_minutes: Minutes,
    pub inbound_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekTravel {
    pub travel_minutes: Minutes,
    pub travel_km: f64,
    pub teams_used: usize,
    pub working_days: usize,
    pub team_days_used: usize,
    pub customers_total: usize,
    pub customers_covered: usize,
    pub coverage_pct: f64,
    pub avg_travel_per_day: f64,
    pub avg_travel_per_team_day: f64,
    pub avg_travel_per_customer: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TravelReport {
    pub team_days: Vec<TeamDayTravel>,
    pub days: Vec<DayTravel>,
    pub teams: Vec<TeamTravel>,
    pub customers: Vec<CustomerTravel>,
    pub week: WeekTravel,
}

impl TravelReport {
    pub fn team_day(&self, slot: SlotKey) -> Option<&TeamDayTravel> {
        self.team_days.iter().find(|entry| entry.slot == slot)
    }

    pub fn day(&self, day: Weekday) -> Option<&DayTravel> {
        self.days.iter().find(|entry| entry.day == day)
    }
}

/// Recomputes travel for a finalized schedule.
pub fn account_travel<M: TravelCosts>(schedule: &WeeklySchedule, ctx: &PlanContext<'_, M>) -> TravelReport {
    let mut team_days = Vec::new();
    let mut customers = Vec::new();

    for slot in schedule.occupied_slots() {
        let mut visits: Vec<&Assignment> = schedule.slot_assignments(slot);
        visits.sort_by_key(|visit| visit.start);
        let locations = ctx.locations(visits.iter().map(|visit| visit.customer_id.as_str()));

        let mut previous = ctx.matrix.depot();
        for (visit, location) in visits.iter().zip(locations.iter().copied()) {
            customers.push(CustomerTravel {
                customer_id: visit.customer_id.clone(),
                day: slot.day,
                team: slot.team,
                inbound_minutes: ctx.matrix.time(previous, location),
                inbound_km: ctx.matrix.distance_km(previous, location),
            });
            previous = location;
        }

        let service_minutes: Minutes = visits.iter().map(|visit| visit.service_minutes).sum();
        team_days.push(TeamDayTravel {
            slot,
            customers: visits.len(),
            service_minutes,
            travel_minutes: round_trip_minutes(ctx.matrix, &locations),
            travel_km: round_trip_km(ctx.matrix, &locations),
            workload_minutes: visits
                .iter()
                .map(|visit| ctx.config.stop_workload(visit.service_minutes))
                .sum(),
            cap_minutes: ctx.cap(slot),
            first_start: visits.first().map(|visit| clock_time(visit.start)),
            last_end: visits.last().map(|visit| clock_time(visit.end)),
        });
    }

    let days: Vec<DayTravel> = WEEK
        .iter()
        .filter_map(|&day| {
            let entries: Vec<&TeamDayTravel> = team_days.iter().filter(|entry| entry.slot.day == day).collect();
            if entries.is_empty() {
                return None;
            }
            let travel_minutes: Minutes = entries.iter().map(|entry| entry.travel_minutes).sum();
            let customers: usize = entries.iter().map(|entry| entry.customers).sum();
            Some(DayTravel {
                day,
                teams: entries.len(),
                customers,
                travel_minutes,
                travel_km: entries.iter().map(|entry| entry.travel_km).sum(),
                avg_travel_per_team: average(travel_minutes as f64, entries.len()),
                avg_travel_per_customer: average(travel_minutes as f64, customers),
            })
        })
        .collect();

    let mut by_team: BTreeMap<TeamId, Vec<&TeamDayTravel>> = BTreeMap::new();
    for entry in &team_days {
        by_team.entry(entry.slot.team).or_default().push(entry);
    }
    let teams: Vec<TeamTravel> = by_team
        .into_iter()
        .map(|(team, entries)| {
            let travel_minutes: Minutes = entries.iter().map(|entry| entry.travel_minutes).sum();
            TeamTravel {
                team,
                days_worked: entries.len(),
                customers: entries.iter().map(|entry| entry.customers).sum(),
                travel_minutes,
                avg_travel_per_day: average(travel_minutes as f64, entries.len()),
            }
        })
        .collect();

    let travel_minutes: Minutes = team_days.iter().map(|entry| entry.travel_minutes).sum();
    let covered: BTreeSet<&str> = schedule.iter().map(|visit| visit.customer_id.as_str()).collect();
    let customers_total = ctx.table.customers().len();
    let week = WeekTravel {
        travel_minutes,
        travel_km: team_days.iter().map(|entry| entry.travel_km).sum(),
        teams_used: teams.len(),
        working_days: days.len(),
        team_days_used: team_days.len(),
        customers_total,
        customers_covered: covered.len(),
        coverage_pct: if customers_total == 0 {
            100.0
        } else {
            percentage(covered.len() as f64, customers_total as f64)
        },
        avg_travel_per_day: average(travel_minutes as f64, days.len()),
        avg_travel_per_team_day: average(travel_minutes as f64, team_days.len()),
        avg_travel_per_customer: average(travel_minutes as f64, covered.len()),
    };

    info!(
        travel_minutes = week.travel_minutes,
        team_days = week.team_days_used,
        coverage_pct = week.coverage_pct,
        "travel accounted"
    );

    TravelReport {
        team_days,
        days,
        teams,
        customers,
        week,
    }
}

/// Per-cluster figures for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub id: usize,
    pub size: usize,
    pub service_minutes: Minutes,
    pub travel_minutes: Minutes,
    pub total_minutes: Minutes,
    pub efficiency_pct: f64,
    pub travel_per_customer: f64,
    pub common_days: WeekdaySet,
    pub flexibility: usize,
    pub fits_in_single_day: bool,
    pub utilisation_pct: f64,
}

pub fn summarize_clusters(clusters: &[Cluster], day_minutes: Minutes) -> Vec<ClusterSummary> {
    clusters
        .iter()
        .map(|cluster| ClusterSummary {
            id: cluster.id,
            size: cluster.size(),
            service_minutes: cluster.service_minutes,
            travel_minutes: cluster.travel_minutes,
            total_minutes: cluster.total_minutes(),
            efficiency_pct: cluster.efficiency_pct(),
            travel_per_customer: cluster.travel_per_customer(),
            common_days: cluster.common_days,
            flexibility: cluster.flexibility(),
            fits_in_single_day: cluster.fits_in_single_day(day_minutes),
            utilisation_pct: cluster.utilisation_pct(day_minutes),
        })
        .collect()
}

fn average(total: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { total / count as f64 }
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 { 0.0 } else { part / whole * 100.0 }
}
