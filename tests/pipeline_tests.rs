//! End-to-end planning tests
//!
//! Runs `plan_week` on small weeks and checks the schedule invariants:
//! one visit per customer at most, visits only on available days and
//! operating team-days, inside the window, and within team-day caps.

mod fixtures;

use std::collections::{BTreeMap, HashSet};

use chrono::Weekday;
use fixtures::{TestCustomer, grid_matrix, init_tracing, team_days, two_towns, working_week_teams};
use week_planner::assign::{PlanState, SolveStatus};
use week_planner::feasibility::{FeasibilityTable, PlanContext};
use week_planner::model::{Assignment, Customer, SlotKey, TeamDay};
use week_planner::rebalance::{Violation, rebalance};
use week_planner::{AssignmentStrategy, PlannerConfig, PlannerError, TravelMatrix, WeeklyPlan, plan_week};

// ============================================================================
// Invariant Checks
// ============================================================================

fn assert_schedule_invariants(plan: &WeeklyPlan, customers: &[Customer], team_days: &[TeamDay], config: &PlannerConfig) {
    let operating: HashSet<SlotKey> = team_days.iter().map(TeamDay::key).collect();

    for customer in customers {
        assert!(
            plan.schedule.assignment_count(&customer.id) <= 1,
            "{} visited more than once",
            customer.id
        );
    }

    for visit in plan.schedule.iter() {
        let customer = customers
            .iter()
            .find(|customer| customer.id == visit.customer_id)
            .expect("scheduled customer exists");
        assert!(customer.available_days.contains(visit.day), "{} on unavailable day", visit.customer_id);
        assert!(operating.contains(&visit.slot()), "{} on a team-day that does not operate", visit.customer_id);
        assert!(visit.start >= config.window_open, "{} starts before open", visit.customer_id);
        assert!(visit.end <= config.window_close, "{} ends after close", visit.customer_id);
        assert_eq!(visit.end - visit.start, customer.service_minutes);
    }

    for slot in plan.schedule.occupied_slots() {
        let mut visits = plan.schedule.slot_assignments(slot);
        visits.sort_by_key(|visit| visit.start);
        for pair in visits.windows(2) {
            assert!(pair[0].end <= pair[1].start, "overlapping visits on {slot}");
        }
    }

    for entry in &plan.report.team_days {
        let reported = plan
            .violations
            .iter()
            .any(|violation| matches!(violation, Violation::Overload { slot, .. } if *slot == entry.slot));
        assert!(
            entry.workload_minutes <= entry.cap_minutes || reported,
            "{} over cap without a violation",
            entry.slot
        );
    }

    let scheduled: HashSet<&str> = plan.schedule.iter().map(|visit| visit.customer_id.as_str()).collect();
    for id in &plan.uncovered {
        assert!(!scheduled.contains(id.as_str()), "{id} reported uncovered but scheduled");
    }
    assert_eq!(scheduled.len() + plan.uncovered.len(), customers.len());
}

// ============================================================================
// Small Weeks
// ============================================================================

#[test]
fn test_single_day_customers_land_on_their_day() {
    init_tracing();
    let config = PlannerConfig::default();
    let customers = vec![
        TestCustomer::new("monday-only").service(60).days(&[Weekday::Mon]).build(),
        TestCustomer::new("wednesday-only").service(60).days(&[Weekday::Wed]).build(),
    ];
    let team_days = working_week_teams(1, 600);
    let matrix = grid_matrix(&[("monday-only", 10, 0), ("wednesday-only", 0, 10)]);

    let plan = plan_week(&customers, &team_days, &matrix, &config).unwrap();

    assert_schedule_invariants(&plan, &customers, &team_days, &config);
    assert_eq!(plan.schedule.day(Weekday::Mon).len(), 1);
    assert_eq!(plan.schedule.day(Weekday::Mon)[0].customer_id, "monday-only");
    assert_eq!(plan.schedule.day(Weekday::Wed).len(), 1);
    assert_eq!(plan.schedule.day(Weekday::Wed)[0].customer_id, "wednesday-only");
    assert!(plan.is_complete());
    assert_eq!(plan.coverage_pct(), 100.0);
}

#[test]
fn test_more_work_than_capacity_reports_uncovered() {
    init_tracing();
    let config = PlannerConfig::default();
    let points: Vec<(String, i32, i32)> = (0..10).map(|i| (format!("c{i}"), 5 + i, 5)).collect();
    let named: Vec<(&str, i32, i32)> = points.iter().map(|(id, x, y)| (id.as_str(), *x, *y)).collect();
    let customers: Vec<Customer> = points
        .iter()
        .map(|(id, _, _)| TestCustomer::new(id).service(240).build())
        .collect();
    let team_days = team_days(&[Weekday::Mon], 1, 600);
    let matrix = grid_matrix(&named);

    let plan = plan_week(&customers, &team_days, &matrix, &config).unwrap();

    assert_schedule_invariants(&plan, &customers, &team_days, &config);
    assert!(!plan.capacity_check.is_feasible());
    assert!(plan.coverage_pct() < 100.0);
    assert!(!plan.schedule.is_empty());
    assert_eq!(plan.uncovered.len(), customers.len() - plan.schedule.len());
    assert_eq!(plan.report.week.customers_covered, plan.schedule.len());
    assert_eq!(plan.report.week.customers_total, customers.len());
    assert!(!plan.is_complete());
}

#[test]
fn test_overloaded_team_day_is_relieved_or_reported() {
    init_tracing();
    let config = PlannerConfig::default();
    let customers: Vec<Customer> = (0..6)
        .map(|i| TestCustomer::new(&format!("c{i}")).service(100).build())
        .collect();
    let team_days = working_week_teams(1, 600);
    let matrix = TravelMatrix::builder("depot").default_minutes(10).build();
    let table = FeasibilityTable::build(&customers, &team_days, &config).unwrap();
    let ctx = PlanContext::new(&table, &matrix, &config);

    let monday = SlotKey::new(Weekday::Mon, 1);
    let mut state = PlanState::new(&table);
    for customer in &customers {
        state.schedule.push(Assignment::provisional(customer, monday));
    }

    let mut routes = BTreeMap::new();
    let report = rebalance(&mut state, &mut routes, &ctx);

    let named = report.violations.iter().any(|violation| match violation {
        Violation::Overload { slot, .. } => *slot == monday,
        Violation::Unplaced { from, .. } => *from == monday,
    });
    assert!(state.ledger.get(monday) <= ctx.cap(monday) || named);
    assert!(report.violations.is_empty(), "{:?}", report.violations);
    assert!(!report.relocations.is_empty());
    assert_eq!(state.schedule.len(), customers.len());
}

#[test]
fn test_overload_with_nowhere_to_go_names_team_day() {
    let config = PlannerConfig::default();
    let customers: Vec<Customer> = (0..6)
        .map(|i| TestCustomer::new(&format!("c{i}")).service(100).days(&[Weekday::Mon]).build())
        .collect();
    let team_days = team_days(&[Weekday::Mon], 1, 600);
    let matrix = TravelMatrix::builder("depot").default_minutes(10).build();
    let table = FeasibilityTable::build(&customers, &team_days, &config).unwrap();
    let ctx = PlanContext::new(&table, &matrix, &config);

    let monday = SlotKey::new(Weekday::Mon, 1);
    let mut state = PlanState::new(&table);
    for customer in &customers {
        state.schedule.push(Assignment::provisional(customer, monday));
    }

    let mut routes = BTreeMap::new();
    let report = rebalance(&mut state, &mut routes, &ctx);

    assert!(!report.violations.is_empty());
    assert!(report.violations.iter().all(|violation| match violation {
        Violation::Overload { slot, .. } => *slot == monday,
        Violation::Unplaced { from, .. } => *from == monday,
    }));
}

// ============================================================================
// Larger Weeks
// ============================================================================

#[test]
fn test_two_towns_fully_covered() {
    init_tracing();
    let config = PlannerConfig::default();
    let (customers, matrix) = two_towns(8, 60);
    let team_days = working_week_teams(2, 600);

    let plan = plan_week(&customers, &team_days, &matrix, &config).unwrap();

    assert_schedule_invariants(&plan, &customers, &team_days, &config);
    assert!(plan.is_complete(), "uncovered {:?}, violations {:?}", plan.uncovered, plan.violations);
    assert_eq!(plan.assignment.assigner, "heuristic");
    assert_eq!(plan.assignment.status, SolveStatus::Greedy);
    assert_eq!(
        plan.assignment.committed.len() + plan.assignment.uncommitted.len(),
        plan.clusters.len()
    );
    assert!(plan.report.week.travel_minutes > 0);
    assert_eq!(plan.routes.iter().map(|route| route.visits).sum::<usize>(), customers.len());
}

#[test]
fn test_exact_strategy_covers_everyone() {
    init_tracing();
    let config = PlannerConfig {
        strategy: AssignmentStrategy::Exact,
        exact_time_budget_ms: 500,
        ..PlannerConfig::default()
    };
    let (customers, matrix) = two_towns(6, 60);
    let team_days = working_week_teams(2, 600);

    let plan = plan_week(&customers, &team_days, &matrix, &config).unwrap();

    assert_schedule_invariants(&plan, &customers, &team_days, &config);
    assert!(plan.is_complete());
    assert!(matches!(
        plan.assignment.status,
        SolveStatus::Optimal | SolveStatus::Feasible | SolveStatus::Greedy
    ));
}

#[test]
fn test_exact_timeout_hands_whole_batch_to_heuristic() {
    init_tracing();
    let config = PlannerConfig {
        strategy: AssignmentStrategy::Exact,
        exact_time_budget_ms: 0,
        exact_deadline_check_nodes: 1,
        ..PlannerConfig::default()
    };
    let (customers, matrix) = two_towns(6, 60);
    let team_days = working_week_teams(2, 600);

    let plan = plan_week(&customers, &team_days, &matrix, &config).unwrap();

    assert_schedule_invariants(&plan, &customers, &team_days, &config);
    assert!(plan.is_complete(), "uncovered {:?}, violations {:?}", plan.uncovered, plan.violations);
    assert_eq!(plan.assignment.assigner, "heuristic");
    assert_eq!(plan.assignment.status, SolveStatus::Greedy);
    assert_eq!(
        plan.assignment.committed.len() + plan.assignment.uncommitted.len(),
        plan.clusters.len()
    );
}

#[test]
fn test_customer_without_operating_day_is_uncovered() {
    let config = PlannerConfig::default();
    let customers = vec![
        TestCustomer::new("weekday").service(60).build(),
        TestCustomer::new("sunday").service(60).days(&[Weekday::Sun]).build(),
    ];
    let team_days = working_week_teams(1, 600);
    let matrix = grid_matrix(&[("weekday", 3, 4), ("sunday", 6, 8)]);

    let plan = plan_week(&customers, &team_days, &matrix, &config).unwrap();

    assert_schedule_invariants(&plan, &customers, &team_days, &config);
    assert_eq!(plan.uncovered, vec!["sunday".to_string()]);
    assert_eq!(plan.coverage_pct(), 50.0);
}

#[test]
fn test_empty_customer_list() {
    let config = PlannerConfig::default();
    let matrix = grid_matrix(&[]);
    let plan = plan_week(&[], &working_week_teams(1, 600), &matrix, &config).unwrap();
    assert!(plan.schedule.is_empty());
    assert!(plan.is_complete());
    assert_eq!(plan.coverage_pct(), 100.0);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_no_team_days_is_an_error() {
    let config = PlannerConfig::default();
    let customers = vec![TestCustomer::new("a").build()];
    let matrix = grid_matrix(&[("a", 1, 1)]);
    let result = plan_week(&customers, &[], &matrix, &config);
    assert!(matches!(result, Err(PlannerError::NoTeamDays)));
}

#[test]
fn test_duplicate_customer_is_an_error() {
    let config = PlannerConfig::default();
    let customers = vec![TestCustomer::new("a").build(), TestCustomer::new("a").service(30).build()];
    let matrix = grid_matrix(&[("a", 1, 1)]);
    let result = plan_week(&customers, &working_week_teams(1, 600), &matrix, &config);
    assert!(matches!(result, Err(PlannerError::DuplicateCustomer(id)) if id == "a"));
}

// ============================================================================
// Serialization
// ============================================================================

#[test]
fn test_plan_serializes_to_json() {
    let config = PlannerConfig::default();
    let (customers, matrix) = two_towns(2, 45);
    let plan = plan_week(&customers, &working_week_teams(1, 600), &matrix, &config).unwrap();

    let value = serde_json::to_value(&plan).unwrap();
    assert_eq!(value["report"]["week"]["customers_total"], 4);
    assert_eq!(value["assignment"]["assigner"], "heuristic");
    assert!(value["schedule"].is_object());
    assert!(value["routes"].as_array().is_some_and(|routes| !routes.is_empty()));
    assert!(value["uncovered"].as_array().is_some_and(Vec::is_empty));
}

#[test]
fn test_config_from_partial_json() {
    let config: PlannerConfig =
        serde_json::from_str(r#"{ "strategy": "exact", "team_day_cap": 480, "exact_weights": { "travel": 3 } }"#)
            .unwrap();
    assert_eq!(config.strategy, AssignmentStrategy::Exact);
    assert_eq!(config.team_day_cap, 480);
    assert_eq!(config.exact_weights.travel, 3);
    assert_eq!(config.exact_weights.coverage, 1000);
    assert_eq!(config.window_open, 510);
}
