//! Domain types for weekly planning.
//!
//! Customers, team-days and the travel matrix are immutable for a run. The
//! weekly schedule is the one mutable artifact, handed from phase to phase.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// Minutes, either a duration or an offset from midnight.
pub type Minutes = i32;

/// Team number as used by the franchise.
pub type TeamId = u32;

/// Planning week in canonical order.
pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub(crate) fn day_index(day: Weekday) -> usize {
    day.num_days_from_monday() as usize
}

/// Converts minutes from midnight into a wall-clock time, clamped to the day.
pub fn clock_time(minutes: Minutes) -> NaiveTime {
    let clamped = minutes.clamp(0, 24 * 60 - 1) as u32;
    NaiveTime::from_hms_opt(clamped / 60, clamped % 60, 0).unwrap_or(NaiveTime::MIN)
}

/// A set of weekdays, iterated Monday first.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Weekday>", into = "Vec<Weekday>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(0b111_1111)
    }

    /// Monday to Friday, the default for customers without an availability record.
    pub const fn working_week() -> Self {
        Self(0b001_1111)
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day_index(day)) != 0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= 1 << day_index(day);
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !(1 << day_index(day));
    }

    pub fn intersection(&self, other: &WeekdaySet) -> WeekdaySet {
        WeekdaySet(self.0 & other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        WEEK.into_iter().filter(|day| self.contains(*day))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = WeekdaySet::empty();
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl From<Vec<Weekday>> for WeekdaySet {
    fn from(days: Vec<Weekday>) -> Self {
        days.into_iter().collect()
    }
}

impl From<WeekdaySet> for Vec<Weekday> {
    fn from(set: WeekdaySet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Debug for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// A customer to be visited once during the week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    /// Service duration in minutes (> 0).
    pub service_minutes: Minutes,
    pub available_days: WeekdaySet,
    /// Key into the travel matrix.
    pub location: String,
}

impl Customer {
    /// Creates a customer whose matrix location key equals its id.
    pub fn new(id: impl Into<String>, service_minutes: Minutes, available_days: WeekdaySet) -> Self {
        let id = id.into();
        Self {
            location: id.clone(),
            id,
            service_minutes,
            available_days,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }
}

/// Identifies one team's slot on one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub day: Weekday,
    pub team: TeamId,
}

impl SlotKey {
    pub fn new(day: Weekday, team: TeamId) -> Self {
        Self { day, team }
    }
}

impl Ord for SlotKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (day_index(self.day), self.team).cmp(&(day_index(other.day), other.team))
    }
}

impl PartialOrd for SlotKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} team {}", self.day, self.team)
    }
}

/// A team operating on a weekday, with its capacity in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamDay {
    pub day: Weekday,
    pub team: TeamId,
    pub capacity: Minutes,
}

impl TeamDay {
    pub fn new(day: Weekday, team: TeamId, capacity: Minutes) -> Self {
        Self { day, team, capacity }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.day, self.team)
    }
}

/// One visit in the weekly schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub customer_id: String,
    pub day: Weekday,
    pub team: TeamId,
    /// Visit start, minutes from midnight.
    pub start: Minutes,
    /// Visit end, minutes from midnight.
    pub end: Minutes,
    pub service_minutes: Minutes,
}

impl Assignment {
    /// An assignment whose times are filled in later by the route sequencer.
    pub fn provisional(customer: &Customer, slot: SlotKey) -> Self {
        Self {
            customer_id: customer.id.clone(),
            day: slot.day,
            team: slot.team,
            start: 0,
            end: 0,
            service_minutes: customer.service_minutes,
        }
    }

    pub fn slot(&self) -> SlotKey {
        SlotKey::new(self.day, self.team)
    }

    pub fn start_time(&self) -> NaiveTime {
        clock_time(self.start)
    }

    pub fn end_time(&self) -> NaiveTime {
        clock_time(self.end)
    }
}

/// Per-weekday ordered assignments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    days: [Vec<Assignment>; 7],
}

impl WeeklySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn day(&self, day: Weekday) -> &[Assignment] {
        &self.days[day_index(day)]
    }

    pub fn push(&mut self, assignment: Assignment) {
        self.days[day_index(assignment.day)].push(assignment);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assignment> {
        self.days.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.days.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Assignments of one team-day, in their stored (visiting) order.
    pub fn slot_assignments(&self, slot: SlotKey) -> Vec<&Assignment> {
        self.day(slot.day)
            .iter()
            .filter(|assignment| assignment.team == slot.team)
            .collect()
    }

    pub fn slot_customer_ids(&self, slot: SlotKey) -> Vec<&str> {
        self.slot_assignments(slot)
            .into_iter()
            .map(|assignment| assignment.customer_id.as_str())
            .collect()
    }

    /// Team-days holding at least one assignment.
    pub fn occupied_slots(&self) -> BTreeSet<SlotKey> {
        self.iter().map(Assignment::slot).collect()
    }

    pub fn assigned_ids(&self) -> HashSet<&str> {
        self.iter().map(|assignment| assignment.customer_id.as_str()).collect()
    }

    pub fn contains_customer(&self, customer_id: &str) -> bool {
        self.iter().any(|assignment| assignment.customer_id == customer_id)
    }

    pub fn assignment_count(&self, customer_id: &str) -> usize {
        self.iter()
            .filter(|assignment| assignment.customer_id == customer_id)
            .count()
    }

    /// Removes every assignment of a customer, returning the first one found.
    pub fn remove_customer(&mut self, customer_id: &str) -> Option<Assignment> {
        let mut removed = None;
        for day in self.days.iter_mut() {
            let (taken, kept): (Vec<Assignment>, Vec<Assignment>) = std::mem::take(day)
                .into_iter()
                .partition(|assignment| assignment.customer_id == customer_id);
            *day = kept;
            if removed.is_none() {
                removed = taken.into_iter().next();
            }
        }
        removed
    }

    /// Removes and returns a team-day's assignments.
    pub fn take_slot(&mut self, slot: SlotKey) -> Vec<Assignment> {
        let day = &mut self.days[day_index(slot.day)];
        let (taken, kept): (Vec<Assignment>, Vec<Assignment>) = std::mem::take(day)
            .into_iter()
            .partition(|assignment| assignment.team == slot.team);
        *day = kept;
        taken
    }

    /// Replaces a team-day's assignments, keeping the day ordered by team then start.
    pub fn replace_slot(&mut self, slot: SlotKey, assignments: Vec<Assignment>) {
        self.take_slot(slot);
        let day = &mut self.days[day_index(slot.day)];
        day.extend(assignments);
        day.sort_by_key(|assignment| (assignment.team, assignment.start));
    }
}

/// A geographically coherent group of customers produced by the clusterer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: usize,
    pub members: Vec<String>,
    /// Nearest-neighbor visiting order, depot excluded.
    pub route: Vec<String>,
    pub service_minutes: Minutes,
    /// Round-trip travel over `route`, depot to depot.
    pub travel_minutes: Minutes,
    pub common_days: WeekdaySet,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn total_minutes(&self) -> Minutes {
        self.service_minutes + self.travel_minutes
    }

    /// Share of the cluster's time spent servicing, in `[0, 1]`.
    pub fn efficiency(&self) -> f64 {
        let total = self.total_minutes();
        if total > 0 {
            self.service_minutes as f64 / total as f64
        } else {
            0.0
        }
    }

    pub fn efficiency_pct(&self) -> f64 {
        self.efficiency() * 100.0
    }

    pub fn travel_per_customer(&self) -> f64 {
        if self.members.is_empty() {
            0.0
        } else {
            self.travel_minutes as f64 / self.members.len() as f64
        }
    }

    /// Number of weekdays on which every member accepts a visit.
    pub fn flexibility(&self) -> usize {
        self.common_days.len()
    }

    pub fn fits_in_single_day(&self, day_minutes: Minutes) -> bool {
        self.total_minutes() <= day_minutes
    }

    pub fn utilisation_pct(&self, day_minutes: Minutes) -> f64 {
        if day_minutes <= 0 {
            return 100.0;
        }
        (self.total_minutes() as f64 / day_minutes as f64 * 100.0).min(100.0)
    }
}
