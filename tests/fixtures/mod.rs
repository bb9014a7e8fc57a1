//! Shared fixtures for the integration tests.
//!
//! Builders for customers and team-days, plus a grid-based travel matrix
//! where travel time is the Manhattan distance between two points.

#![allow(dead_code)]

use chrono::Weekday;
use tracing_subscriber::EnvFilter;
use week_planner::matrix::TravelMatrix;
use week_planner::model::{Customer, TeamDay, WeekdaySet};

pub const WORKING_WEEK: [Weekday; 5] = [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];

/// Installs a test-writer subscriber once. `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builder for test customers with sensible defaults.
#[derive(Clone, Debug)]
pub struct TestCustomer {
    id: String,
    service: i32,
    days: WeekdaySet,
    location: Option<String>,
}

impl TestCustomer {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            service: 60,
            days: WeekdaySet::working_week(),
            location: None,
        }
    }

    pub fn service(mut self, minutes: i32) -> Self {
        self.service = minutes;
        self
    }

    pub fn days(mut self, days: &[Weekday]) -> Self {
        self.days = days.iter().copied().collect();
        self
    }

    pub fn at(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }

    pub fn build(self) -> Customer {
        let customer = Customer::new(self.id, self.service, self.days);
        match self.location {
            Some(location) => customer.with_location(location),
            None => customer,
        }
    }
}

/// `teams` teams working every listed day with the same capacity.
pub fn team_days(days: &[Weekday], teams: u32, capacity: i32) -> Vec<TeamDay> {
    days.iter()
        .flat_map(|&day| (1..=teams).map(move |team| TeamDay::new(day, team, capacity)))
        .collect()
}

pub fn working_week_teams(teams: u32, capacity: i32) -> Vec<TeamDay> {
    team_days(&WORKING_WEEK, teams, capacity)
}

/// Full matrix over named grid points, depot at the origin. Travel time is
/// the Manhattan distance in minutes; distance is half that in km.
pub fn grid_matrix(points: &[(&str, i32, i32)]) -> TravelMatrix {
    let mut all: Vec<(&str, i32, i32)> = vec![("depot", 0, 0)];
    all.extend_from_slice(points);

    let mut builder = TravelMatrix::builder("depot");
    for &(from, fx, fy) in &all {
        for &(to, tx, ty) in &all {
            if from != to {
                let minutes = (fx - tx).abs() + (fy - ty).abs();
                builder.insert(from, to, minutes, minutes as f64 / 2.0);
            }
        }
    }
    builder.build()
}

/// Two neighbourhoods east and west of the depot, `per_town` customers each,
/// every customer available all week.
pub fn two_towns(per_town: usize, service: i32) -> (Vec<Customer>, TravelMatrix) {
    let mut points: Vec<(String, i32, i32)> = Vec::new();
    for i in 0..per_town {
        let offset = i as i32 * 2;
        points.push((format!("east-{i}"), 20 + offset, offset));
        points.push((format!("west-{i}"), -20 - offset, offset));
    }

    let customers = points
        .iter()
        .map(|(id, _, _)| TestCustomer::new(id).service(service).build())
        .collect();
    let named: Vec<(&str, i32, i32)> = points.iter().map(|(id, x, y)| (id.as_str(), *x, *y)).collect();
    (customers, grid_matrix(&named))
}
