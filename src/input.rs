//! CSV readers for the cleaned input tables.
//!
//! The tables come from upstream extraction and matrix-building tools. Gaps
//! in a single record are defaulted with a warning; only an unreadable file
//! or malformed CSV is an error.

use std::fs::File;
use std::io;
use std::path::Path;
use std::str::FromStr;

use chrono::Weekday;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::PlannerConfig;
use crate::error::Result;
use crate::matrix::{TravelMatrix, estimate_km};
use crate::model::{Customer, Minutes, TeamDay, TeamId, WeekdaySet};

// =============================================================================
// CSV ROW TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
struct CustomerRow {
    #[serde(alias = "id", alias = "customer")]
    customer_id: String,
    #[serde(alias = "service", alias = "duration", default, deserialize_with = "csv::invalid_option")]
    service_minutes: Option<Minutes>,
    #[serde(alias = "days", default)]
    available_days: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TeamDayRow {
    #[serde(alias = "weekday")]
    day: String,
    team: TeamId,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    availability: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(alias = "origin")]
    from: String,
    #[serde(alias = "destination")]
    to: String,
    #[serde(alias = "time", alias = "duration")]
    minutes: Minutes,
    #[serde(alias = "distance", default, deserialize_with = "csv::invalid_option")]
    km: Option<f64>,
}

fn csv_reader<R: io::Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

/// Parses a `;`-separated weekday list such as `Mon;Wed;Friday`.
/// Unknown names are skipped with a warning.
pub fn parse_weekdays(field: &str) -> WeekdaySet {
    field
        .split(';')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| match Weekday::from_str(token) {
            Ok(day) => Some(day),
            Err(_) => {
                warn!(token, "unknown weekday name ignored");
                None
            }
        })
        .collect()
}

// =============================================================================
// CUSTOMERS
// =============================================================================

/// Reads `customer_id,service_minutes,available_days,location`.
pub fn read_customers<R: io::Read>(reader: R, config: &PlannerConfig) -> Result<Vec<Customer>> {
    let mut reader = csv_reader(reader);
    let mut customers = Vec::new();
    let mut defaulted = 0;

    for result in reader.deserialize() {
        let row: CustomerRow = result?;
        let id = row.customer_id;
        if id.is_empty() {
            warn!("customer row without id skipped");
            continue;
        }

        let service_minutes = match row.service_minutes {
            Some(minutes) if minutes > 0 && minutes <= config.max_service_minutes => minutes,
            other => {
                warn!(customer = %id, service = ?other, default = config.default_service_minutes, "invalid service duration, using default");
                defaulted += 1;
                config.default_service_minutes
            }
        };

        let available_days = match row.available_days.as_deref().map(parse_weekdays) {
            Some(days) if !days.is_empty() => days,
            _ => {
                warn!(customer = %id, "no availability record, assuming Monday to Friday");
                defaulted += 1;
                WeekdaySet::working_week()
            }
        };

        let customer = Customer::new(id, service_minutes, available_days);
        customers.push(match row.location {
            Some(location) if !location.is_empty() => customer.with_location(location),
            _ => customer,
        });
    }

    info!(customers = customers.len(), defaulted, "customers loaded");
    Ok(customers)
}

// =============================================================================
// TEAM-DAYS
// =============================================================================

/// Reads `day,team,availability`, where availability is the fraction of the
/// operating window the team works that day. Rows whose availability is not
/// a finite number are skipped.
pub fn read_team_days<R: io::Read>(reader: R, config: &PlannerConfig) -> Result<Vec<TeamDay>> {
    let mut reader = csv_reader(reader);
    let mut team_days = Vec::new();

    for result in reader.deserialize() {
        let row: TeamDayRow = result?;
        let Ok(day) = Weekday::from_str(&row.day) else {
            warn!(day = %row.day, team = row.team, "unknown weekday, team-day skipped");
            continue;
        };
        let availability = row.availability.unwrap_or_else(|| {
            warn!(day = ?day, team = row.team, "missing availability, assuming full day");
            1.0
        });
        if !availability.is_finite() {
            warn!(day = ?day, team = row.team, availability, "availability is not a number, team-day skipped");
            continue;
        }
        if availability <= config.min_team_availability {
            debug!(day = ?day, team = row.team, availability, "team not working");
            continue;
        }

        let capacity = (availability.min(1.0) * config.operating_minutes() as f64).floor() as Minutes;
        team_days.push(TeamDay::new(day, row.team, capacity));
    }

    info!(team_days = team_days.len(), "team-days loaded");
    Ok(team_days)
}

// =============================================================================
// TRAVEL MATRIX
// =============================================================================

/// Reads the long-format matrix `from,to,minutes,km`. Rows with a negative
/// time are skipped; a missing distance is estimated from the time.
pub fn read_travel_matrix<R: io::Read>(reader: R, depot: &str) -> Result<TravelMatrix> {
    let mut reader = csv_reader(reader);
    let mut builder = TravelMatrix::builder(depot);
    let mut entries = 0;

    for result in reader.deserialize() {
        let row: MatrixRow = result?;
        if row.minutes < 0 {
            warn!(from = %row.from, to = %row.to, minutes = row.minutes, "negative travel time skipped");
            continue;
        }
        let km = row.km.unwrap_or_else(|| estimate_km(row.minutes));
        builder.insert(row.from, row.to, row.minutes, km);
        entries += 1;
    }

    let matrix = builder.build();
    info!(entries, locations = matrix.size(), "travel matrix loaded");
    Ok(matrix)
}

pub fn load_customers(path: impl AsRef<Path>, config: &PlannerConfig) -> Result<Vec<Customer>> {
    read_customers(File::open(path)?, config)
}

pub fn load_team_days(path: impl AsRef<Path>, config: &PlannerConfig) -> Result<Vec<TeamDay>> {
    read_team_days(File::open(path)?, config)
}

pub fn load_travel_matrix(path: impl AsRef<Path>, depot: &str) -> Result<TravelMatrix> {
    read_travel_matrix(File::open(path)?, depot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weekdays() {
        let days = parse_weekdays("Mon; wed ;Friday;;Funday");
        let list: Vec<Weekday> = days.iter().collect();
        assert_eq!(list, vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);
        assert!(parse_weekdays("").is_empty());
    }
}
