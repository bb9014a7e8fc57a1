//! Route sequencer tests
//!
//! Route order, visit timestamps, window and cap enforcement, and the
//! nearest-neighbor fallback.

mod fixtures;

use std::collections::BTreeSet;

use chrono::{NaiveTime, Weekday};
use fixtures::{TestCustomer, grid_matrix, init_tracing};
use week_planner::PlannerConfig;
use week_planner::feasibility::{FeasibilityTable, PlanContext};
use week_planner::matrix::TravelMatrix;
use week_planner::model::{Assignment, Customer, SlotKey, TeamDay, WeeklySchedule};
use week_planner::sequence::{RouteStrategy, sequence_slots, sequence_team_day};

// ============================================================================
// Helpers
// ============================================================================

fn monday() -> SlotKey {
    SlotKey::new(Weekday::Mon, 1)
}

fn one_team_all_week() -> Vec<TeamDay> {
    [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ]
    .into_iter()
    .map(|day| TeamDay::new(day, 1, 600))
    .collect()
}

fn refs(customers: &[Customer]) -> Vec<&Customer> {
    customers.iter().collect()
}

/// Three customers A, B and C where the only cheap loop is A -> B -> C.
/// Pairs not listed cost 30 minutes.
fn three_stop_loop() -> (Vec<Customer>, TravelMatrix) {
    let customers = ["A", "B", "C"]
        .iter()
        .map(|id| TestCustomer::new(id).service(30).build())
        .collect();
    let matrix = TravelMatrix::builder("depot")
        .default_minutes(30)
        .entry("depot", "A", 10, 6.0)
        .entry("A", "B", 5, 3.0)
        .entry("B", "C", 8, 5.0)
        .entry("C", "depot", 12, 7.0)
        .entry("depot", "B", 9, 5.5)
        .entry("B", "depot", 9, 5.5)
        .entry("depot", "C", 14, 8.0)
        .build();
    (customers, matrix)
}

// ============================================================================
// Route Order and Timing
// ============================================================================

#[test]
fn test_three_customer_route_order_and_times() {
    init_tracing();
    let config = PlannerConfig::default();
    let (customers, matrix) = three_stop_loop();
    let table = FeasibilityTable::build(&customers, &one_team_all_week(), &config).unwrap();
    let ctx = PlanContext::new(&table, &matrix, &config);

    let route = sequence_team_day(monday(), &refs(&customers), &ctx);

    assert_eq!(route.strategy, RouteStrategy::Solver);
    assert_eq!(route.customer_ids().collect::<Vec<_>>(), vec!["A", "B", "C"]);
    assert_eq!(route.travel_minutes, 35);
    assert!(route.dropped.is_empty());

    let windows: Vec<(i32, i32)> = route.visits.iter().map(|visit| (visit.start, visit.end)).collect();
    assert_eq!(windows, vec![(520, 550), (555, 585), (593, 623)]);
    assert_eq!(route.visits[0].start_time(), NaiveTime::from_hms_opt(8, 40, 0).unwrap());
    assert_eq!(route.visits[2].end_time(), NaiveTime::from_hms_opt(10, 23, 0).unwrap());
}

#[test]
fn test_input_order_does_not_change_route() {
    let config = PlannerConfig::default();
    let (customers, matrix) = three_stop_loop();
    let table = FeasibilityTable::build(&customers, &one_team_all_week(), &config).unwrap();
    let ctx = PlanContext::new(&table, &matrix, &config);

    let reversed: Vec<&Customer> = customers.iter().rev().collect();
    let route = sequence_team_day(monday(), &reversed, &ctx);
    assert_eq!(route.customer_ids().collect::<Vec<_>>(), vec!["A", "B", "C"]);
    assert_eq!(route.travel_minutes, 35);
}

#[test]
fn test_visits_never_overlap() {
    let config = PlannerConfig::default();
    let customers: Vec<Customer> = (0..6)
        .map(|i| TestCustomer::new(&format!("c{i}")).service(40).build())
        .collect();
    let matrix = grid_matrix(&[
        ("c0", 5, 0),
        ("c1", 10, 0),
        ("c2", 10, 5),
        ("c3", 0, 12),
        ("c4", -4, 6),
        ("c5", -8, -2),
    ]);
    let table = FeasibilityTable::build(&customers, &one_team_all_week(), &config).unwrap();
    let ctx = PlanContext::new(&table, &matrix, &config);

    let route = sequence_team_day(monday(), &refs(&customers), &ctx);
    assert_eq!(route.visits.len(), 6);
    assert!(route.visits[0].start >= config.window_open);
    for pair in route.visits.windows(2) {
        assert!(pair[0].end <= pair[1].start, "{:?} overlaps {:?}", pair[0], pair[1]);
    }
    for visit in &route.visits {
        assert_eq!(visit.end - visit.start, visit.service_minutes);
    }
}

// ============================================================================
// Window and Cap
// ============================================================================

#[test]
fn test_visit_that_cannot_end_before_close_is_dropped() {
    let config = PlannerConfig::default();
    let customers = vec![
        TestCustomer::new("morning").service(250).build(),
        TestCustomer::new("midday").service(250).build(),
        TestCustomer::new("late").service(250).build(),
    ];
    let matrix = TravelMatrix::builder("depot").default_minutes(10).build();
    let table = FeasibilityTable::build(&customers, &one_team_all_week(), &config).unwrap();
    let ctx = PlanContext::new(&table, &matrix, &config);

    let route = sequence_team_day(monday(), &refs(&customers), &ctx);
    assert_eq!(route.visits.len(), 2);
    assert_eq!(route.dropped.len(), 1);
    assert!(route.visits.iter().all(|visit| visit.end <= config.window_close));
}

#[test]
fn test_route_respects_team_day_cap() {
    let config = PlannerConfig::default();
    let customers: Vec<Customer> = (0..4)
        .map(|i| TestCustomer::new(&format!("c{i}")).service(100).build())
        .collect();
    let matrix = TravelMatrix::builder("depot").default_minutes(20).build();
    // 300 minutes of cap: two visits (2 x 100 service + 3 x 20 travel) fit, three do not.
    let team_days = vec![TeamDay::new(Weekday::Mon, 1, 300)];
    let table = FeasibilityTable::build(&customers, &team_days, &config).unwrap();
    let ctx = PlanContext::new(&table, &matrix, &config);

    let route = sequence_team_day(monday(), &refs(&customers), &ctx);
    assert_eq!(route.visits.len(), 2);
    assert_eq!(route.dropped.len(), 2);
    let workload: i32 = route.visits.iter().map(|visit| visit.service_minutes).sum::<i32>() + route.travel_minutes;
    assert!(workload <= 300);
}

// ============================================================================
// Fallback
// ============================================================================

#[test]
fn test_fallback_walks_to_nearest_customer() {
    let config = PlannerConfig {
        route_time_budget_ms: 0,
        ..PlannerConfig::default()
    };
    let (customers, matrix) = three_stop_loop();
    let table = FeasibilityTable::build(&customers, &one_team_all_week(), &config).unwrap();
    let ctx = PlanContext::new(&table, &matrix, &config);

    let route = sequence_team_day(monday(), &refs(&customers), &ctx);
    assert_eq!(route.strategy, RouteStrategy::NearestNeighbor);
    // Nearest from the depot is B (9), then C (8), then A (30), then home (30).
    assert_eq!(route.customer_ids().collect::<Vec<_>>(), vec!["B", "C", "A"]);
    assert_eq!(route.travel_minutes, 9 + 8 + 30 + 30);
    assert!(route.dropped.is_empty());
}

// ============================================================================
// Whole Schedule
// ============================================================================

fn seeded_schedule(customers: &[Customer], assignments: &[(usize, SlotKey)]) -> WeeklySchedule {
    let mut schedule = WeeklySchedule::new();
    for &(idx, slot) in assignments {
        schedule.push(Assignment::provisional(&customers[idx], slot));
    }
    schedule
}

#[test]
fn test_sequence_slots_rewrites_schedule_times() {
    let config = PlannerConfig::default();
    let (customers, matrix) = three_stop_loop();
    let table = FeasibilityTable::build(&customers, &one_team_all_week(), &config).unwrap();
    let ctx = PlanContext::new(&table, &matrix, &config);

    let tuesday = SlotKey::new(Weekday::Tue, 1);
    let mut schedule = seeded_schedule(&customers, &[(2, monday()), (0, monday()), (1, tuesday)]);
    let slots = BTreeSet::from([monday(), tuesday]);

    let routes = sequence_slots(&slots, &mut schedule, &ctx);
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].slot, monday());
    assert_eq!(routes[1].slot, tuesday);

    assert_eq!(schedule.slot_customer_ids(monday()), vec!["A", "C"]);
    let tuesday_visits = schedule.slot_assignments(tuesday);
    assert_eq!(tuesday_visits.len(), 1);
    assert_eq!(tuesday_visits[0].start, 510 + 9);
    assert!(schedule.iter().all(|visit| visit.start >= config.window_open));
}

#[test]
fn test_parallel_and_sequential_sequencing_agree() {
    let (customers, matrix) = three_stop_loop();
    let parallel = PlannerConfig::default();
    let sequential = PlannerConfig {
        parallel_sequencing: false,
        ..PlannerConfig::default()
    };
    let assignments = [(0, monday()), (1, monday()), (2, SlotKey::new(Weekday::Wed, 1))];

    let mut results = Vec::new();
    for config in [&parallel, &sequential] {
        let table = FeasibilityTable::build(&customers, &one_team_all_week(), config).unwrap();
        let ctx = PlanContext::new(&table, &matrix, config);
        let mut schedule = seeded_schedule(&customers, &assignments);
        let slots = schedule.occupied_slots();
        let routes = sequence_slots(&slots, &mut schedule, &ctx);
        results.push((routes, schedule));
    }

    assert_eq!(results[0], results[1]);
}
