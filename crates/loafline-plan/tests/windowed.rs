//! Rolling-window controller behavior: stitching, pipeline hand-off,
//! extractor idempotence, and cooperative cancellation.

use chrono::NaiveDate;
use loafline_core::{
    CostStructure, Forecast, LaborCalendar, LaborDay, Node, PlanInput, PlanningHorizon, Route,
    ShelfLifeParams, SolveMode, StorageState,
};
use loafline_plan::index::build_index;
use loafline_plan::solver::solve_model;
use loafline_plan::{
    extract, preprocess, solve, solve_plan_cancellable, CancelToken, ModelType, PlanError,
    SolveStatus,
};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
}

fn long_horizon_input() -> PlanInput {
    let nodes = vec![
        Node::new("P", "Plant").producing(),
        Node::new("H", "Hub").hub().with_demand(),
    ];
    let routes = vec![Route::new("r1", "P", "H", 1, StorageState::Ambient, 0.1)];
    let mut forecast = Forecast::default();
    for d in 6..=25 {
        forecast.push("H", "P1", date(d), 100.0);
    }
    let mut calendar = LaborCalendar::new();
    for d in PlanningHorizon::new(date(4), date(25)).unwrap().dates() {
        calendar.insert(d, LaborDay::fixed(12.0, 2.0, 1400.0));
    }
    let mut input = PlanInput {
        nodes,
        routes,
        trucks: Vec::new(),
        labor_calendar: calendar,
        forecast,
        costs: CostStructure::default(),
        shelf_life: ShelfLifeParams::default(),
        horizon_override: None,
        config: Default::default(),
    };
    input.config.solve_mode = SolveMode::Windowed;
    input.config.window_days = 10;
    input.config.commit_days = 5;
    input
}

/// Four stitched windows reconstruct the full 20-day demand without gaps,
/// overlaps, or stranded in-flight goods at the boundaries.
#[test]
fn windows_stitch_into_one_plan() {
    let input = long_horizon_input();
    let solution = solve(&input).unwrap();

    assert_eq!(solution.model_type, ModelType::Windowed);
    assert_eq!(solution.status, SolveStatus::Optimal);
    assert_eq!(solution.demand_satisfaction.len(), 20);
    assert!(solution.fill_rate > 0.999, "fill rate {}", solution.fill_rate);
    assert!((solution.total_production - 2000.0).abs() < 2.0);

    // Committed slices are disjoint: one demand record per (date, product).
    let mut dates: Vec<_> = solution
        .demand_satisfaction
        .iter()
        .map(|d| d.date)
        .collect();
    dates.dedup();
    assert_eq!(dates.len(), 20);

    // Every committed day's demand is actually covered by an arrival on
    // that day, including the first day of each continuation window.
    for record in &solution.demand_satisfaction {
        assert!(
            record.shortage < 1e-2,
            "day {} went short across a stitch boundary",
            record.date
        );
    }
}

/// A horizon that fits in one window falls through to a single monolithic
/// solve, reported as windowed.
#[test]
fn short_horizon_degenerates_to_single_window() {
    let mut input = long_horizon_input();
    input.forecast = {
        let mut f = Forecast::default();
        f.push("H", "P1", date(6), 100.0);
        f
    };
    let solution = solve(&input).unwrap();
    assert_eq!(solution.model_type, ModelType::Windowed);
    assert!(solution.fill_rate > 0.999);
}

/// Bad window configuration is a config error, not a bad plan.
#[test]
fn commit_longer_than_window_is_config_error() {
    let mut input = long_horizon_input();
    input.config.commit_days = 40;
    match solve(&input) {
        Err(PlanError::Config { field, .. }) => assert!(field.contains("commit_days")),
        other => panic!("expected Config error, got {other:?}"),
    }
}

/// Running the extractor twice over the same solved session yields
/// identical records.
#[test]
fn extractor_is_idempotent() {
    let mut input = long_horizon_input();
    input.config.solve_mode = SolveMode::Monolithic;
    input.forecast = {
        let mut f = Forecast::default();
        f.push("H", "P1", date(8), 300.0);
        f
    };

    let plan = preprocess(&input, &[]).unwrap();
    let index = build_index(&input, &plan);
    let outcome = solve_model(&input, &plan, &index, None).unwrap();

    let first =
        extract::extract_solution(&input, &plan, &index, &outcome, ModelType::SlidingWindow)
            .unwrap();
    let second =
        extract::extract_solution(&input, &plan, &index, &outcome, ModelType::SlidingWindow)
            .unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

/// A token cancelled before the solve starts aborts cooperatively.
#[test]
fn cancellation_before_solve() {
    let mut input = long_horizon_input();
    input.config.solve_mode = SolveMode::Monolithic;
    let token = CancelToken::new();
    token.cancel();
    match solve_plan_cancellable(&input, &token) {
        Err(PlanError::Cancelled) => {}
        other => panic!("expected Cancelled, got {other:?}"),
    }
}
