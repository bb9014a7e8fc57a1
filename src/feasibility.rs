//! Feasibility table: the valid (customer, weekday, team) combinations.
//!
//! Built once from the customer pool and the team-days of the target week.
//! Every later phase asks this table which slots a customer may occupy and
//! what a slot's effective capacity is.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Weekday;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PlannerConfig;
use crate::error::{PlannerError, Result};
use crate::model::{Customer, Minutes, SlotKey, TeamDay, WEEK};
use crate::traits::TravelCosts;

/// Upfront comparison of required work against available capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapacityCheck {
    /// Sum of service plus travel allowance over all customers.
    pub required_minutes: Minutes,
    /// Sum of effective team-day caps.
    pub available_minutes: Minutes,
}

impl CapacityCheck {
    pub fn is_feasible(&self) -> bool {
        self.required_minutes <= self.available_minutes
    }
}

#[derive(Debug, Clone)]
pub struct FeasibilityTable {
    customers: Vec<Customer>,
    by_id: HashMap<String, usize>,
    team_days: BTreeMap<SlotKey, TeamDay>,
    caps: BTreeMap<SlotKey, Minutes>,
    combinations: Vec<Vec<SlotKey>>,
}

impl FeasibilityTable {
    pub fn build(customers: &[Customer], team_days: &[TeamDay], config: &PlannerConfig) -> Result<Self> {
        if team_days.is_empty() {
            return Err(PlannerError::NoTeamDays);
        }

        let mut by_id = HashMap::with_capacity(customers.len());
        for (idx, customer) in customers.iter().enumerate() {
            if customer.service_minutes <= 0 {
                return Err(PlannerError::invalid_input(format!(
                    "customer {} has non-positive service duration {}",
                    customer.id, customer.service_minutes
                )));
            }
            if by_id.insert(customer.id.clone(), idx).is_some() {
                return Err(PlannerError::DuplicateCustomer(customer.id.clone()));
            }
        }

        let mut by_slot = BTreeMap::new();
        let mut caps = BTreeMap::new();
        for team_day in team_days {
            let key = team_day.key();
            if by_slot.insert(key, *team_day).is_some() {
                return Err(PlannerError::invalid_input(format!("team-day {key} listed twice")));
            }
            caps.insert(key, team_day.capacity.min(config.team_day_cap).max(0));
        }

        let combinations: Vec<Vec<SlotKey>> = customers
            .iter()
            .map(|customer| {
                by_slot
                    .keys()
                    .copied()
                    .filter(|slot| customer.available_days.contains(slot.day))
                    .collect()
            })
            .collect();

        let table = Self {
            customers: customers.to_vec(),
            by_id,
            team_days: by_slot,
            caps,
            combinations,
        };

        for customer in table.customers.iter() {
            if table.slots_for(&customer.id).is_empty() {
                warn!(customer = %customer.id, "no team operates on any day the customer accepts");
            }
        }

        info!(
            combinations = table.combination_count(),
            customers = table.customers.len(),
            team_days = table.team_days.len(),
            "feasibility table built"
        );
        for day in WEEK {
            let count: usize = table
                .combinations
                .iter()
                .map(|slots| slots.iter().filter(|slot| slot.day == day).count())
                .sum();
            if count > 0 {
                tracing::debug!(day = ?day, combinations = count, "combinations by day");
            }
        }

        Ok(table)
    }

    /// Customers in input order.
    pub fn customers(&self) -> &[Customer] {
        &self.customers
    }

    pub fn customer(&self, id: &str) -> Option<&Customer> {
        self.by_id.get(id).map(|&idx| &self.customers[idx])
    }

    /// Valid slots for a customer, ordered by weekday then team.
    pub fn slots_for(&self, id: &str) -> &[SlotKey] {
        self.by_id
            .get(id)
            .map(|&idx| self.combinations[idx].as_slice())
            .unwrap_or(&[])
    }

    pub fn is_valid(&self, id: &str, slot: SlotKey) -> bool {
        self.slots_for(id).contains(&slot)
    }

    /// Every team-day of the week, ordered by weekday then team.
    pub fn slots(&self) -> impl Iterator<Item = SlotKey> + '_ {
        self.team_days.keys().copied()
    }

    pub fn teams_on(&self, day: Weekday) -> impl Iterator<Item = SlotKey> + '_ {
        self.slots().filter(move |slot| slot.day == day)
    }

    pub fn team_day(&self, slot: SlotKey) -> Option<&TeamDay> {
        self.team_days.get(&slot)
    }

    /// Effective capacity: the team-day's own capacity bounded by the hard cap.
    pub fn cap(&self, slot: SlotKey) -> Minutes {
        self.caps.get(&slot).copied().unwrap_or(0)
    }

    pub fn combination_count(&self) -> usize {
        self.combinations.iter().map(Vec::len).sum()
    }

    pub fn capacity_check(&self, config: &PlannerConfig) -> CapacityCheck {
        CapacityCheck {
            required_minutes: self
                .customers
                .iter()
                .map(|customer| config.stop_workload(customer.service_minutes))
                .sum(),
            available_minutes: self.caps.values().sum(),
        }
    }

    /// Warns once per customer location, and for the depot, missing from the matrix.
    pub fn report_missing_locations<M: TravelCosts>(&self, matrix: &M) -> usize {
        let mut missing = 0;
        if !matrix.has_location(matrix.depot()) {
            warn!(depot = matrix.depot(), "depot missing from travel matrix, using default travel times");
            missing += 1;
        }
        for customer in &self.customers {
            if !matrix.has_location(&customer.location) {
                warn!(
                    customer = %customer.id,
                    location = %customer.location,
                    "location missing from travel matrix, using default travel times"
                );
                missing += 1;
            }
        }
        missing
    }

    /// Counts directed pairs between known locations (depot and customers)
    /// that the matrix has no entry for. Locations absent altogether are
    /// left to [`Self::report_missing_locations`]. Warns once per origin.
    pub fn report_missing_pairs<M: TravelCosts>(&self, matrix: &M) -> usize {
        let locations: BTreeSet<&str> = std::iter::once(matrix.depot())
            .chain(self.customers.iter().map(|customer| customer.location.as_str()))
            .filter(|key| matrix.has_location(key))
            .collect();

        let mut missing = 0;
        for &from in &locations {
            let gaps = locations
                .iter()
                .filter(|&&to| !matrix.has_entry(from, to))
                .inspect(|&&to| debug!(from, to, "travel matrix pair missing"))
                .count();
            if gaps > 0 {
                warn!(from, missing = gaps, "travel matrix pairs missing, using default travel times");
                missing += gaps;
            }
        }
        missing
    }
}

/// Read-only inputs shared by every phase of a run.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a, M> {
    pub table: &'a FeasibilityTable,
    pub matrix: &'a M,
    pub config: &'a PlannerConfig,
}

impl<'a, M: TravelCosts> PlanContext<'a, M> {
    pub fn new(table: &'a FeasibilityTable, matrix: &'a M, config: &'a PlannerConfig) -> Self {
        Self { table, matrix, config }
    }

    pub fn customer(&self, id: &str) -> Option<&'a Customer> {
        self.table.customer(id)
    }

    pub fn cap(&self, slot: SlotKey) -> Minutes {
        self.table.cap(slot)
    }

    /// Matrix location keys for customer ids, in the same order. Unknown ids
    /// are used as their own location key.
    pub fn locations<'s, I>(&self, ids: I) -> Vec<&'s str>
    where
        I: IntoIterator<Item = &'s str>,
        'a: 's,
    {
        ids.into_iter()
            .map(|id| match self.table.customer(id) {
                Some(customer) => customer.location.as_str(),
                None => id,
            })
            .collect()
    }
}
