//! End-to-end planning scenarios over small, fully-determined networks.
//!
//! Each test builds a complete input, runs a real solve, and asserts the
//! literal plan the network forces: which day production must land on,
//! which truck carries it, where state transitions happen, and what goes
//! short when the calendar offers no ride.

use chrono::NaiveDate;
use loafline_core::{
    CostStructure, DayOfWeek, DepartureWindow, Forecast, LaborCalendar, LaborDay, Node, PlanInput,
    PlanningHorizon, Route, ShelfLifeParams, StorageState, TruckCadence, TruckSchedule,
};
use loafline_plan::{
    preprocess, solve_plan, BatchKind, ModelType, PlanError, SolveStatus,
};

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, m, d).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn calendar_over(start: NaiveDate, end: NaiveDate, rate: f64) -> LaborCalendar {
    let mut calendar = LaborCalendar::new();
    for d in PlanningHorizon::new(start, end).unwrap().dates() {
        calendar.insert(d, LaborDay::fixed(12.0, 2.0, rate));
    }
    calendar
}

fn base_input(nodes: Vec<Node>, routes: Vec<Route>, trucks: Vec<TruckSchedule>) -> PlanInput {
    PlanInput {
        nodes,
        routes,
        trucks,
        labor_calendar: LaborCalendar::new(),
        forecast: Forecast::default(),
        costs: CostStructure::default(),
        shelf_life: ShelfLifeParams::default(),
        horizon_override: None,
        config: Default::default(),
    }
}

/// Trivial single-day, single-product solve: the plant is its own
/// breadroom, production lands on the only staffed day, nothing is short.
#[test]
fn trivial_single_day_single_product() {
    init_tracing();
    let mut input = base_input(
        vec![Node::new("N", "Plant & breadroom").producing().with_demand()],
        Vec::new(),
        Vec::new(),
    );
    input.forecast.push("N", "P", date(1, 6), 100.0);
    // Only the demand date is staffed, so production cannot land elsewhere.
    let mut calendar = LaborCalendar::new();
    calendar.insert(date(1, 6), LaborDay::fixed(12.0, 2.0, 1400.0));
    input.labor_calendar = calendar;

    let solution = solve_plan(&input).unwrap();

    assert_eq!(solution.status, SolveStatus::Optimal);
    assert_eq!(solution.model_type, ModelType::SlidingWindow);
    assert!((solution.total_production - 100.0).abs() < 1e-3);
    assert_eq!(solution.production_batches.len(), 1);
    let batch = &solution.production_batches[0];
    assert_eq!(batch.date, date(1, 6));
    assert_eq!(batch.kind, BatchKind::Production);
    assert!((batch.labor_hours_allocated - 100.0 / 1400.0).abs() < 1e-4);
    assert!(solution.total_shortage() < 1e-3);
    assert!((solution.fill_rate - 1.0).abs() < 1e-6);
    assert!(solution.shipments.is_empty());

    // Costs: 100 units of production plus the labor to make them.
    let expected = 100.0 * input.costs.production_cost_per_unit
        + (100.0 / 1400.0) * input.costs.regular_rate_per_hour;
    assert!((solution.total_cost.total - expected).abs() < 0.5);
}

/// Morning trucks load only D-1 production: Tuesday demand behind a Monday
/// morning truck forces Sunday production.
#[test]
fn morning_truck_loads_previous_day_production() {
    init_tracing();
    let mut input = base_input(
        vec![
            Node::new("P", "Plant").producing(),
            Node::new("H", "Hub").hub().with_demand(),
        ],
        vec![Route::new("r1", "P", "H", 1, StorageState::Ambient, 0.1)],
        vec![TruckSchedule::new(
            "T-MON",
            "P",
            "H",
            TruckCadence::Weekly(DayOfWeek::Monday),
            DepartureWindow::Morning,
            5000.0,
        )],
    );
    input.forecast.push("H", "P1", date(1, 7), 1000.0); // Tuesday
    input.labor_calendar = calendar_over(date(1, 5), date(1, 7), 1400.0);

    let solution = solve_plan(&input).unwrap();

    assert_eq!(solution.status, SolveStatus::Optimal);
    assert!(solution.total_shortage() < 1e-3);

    // Production on Sunday, not Monday.
    let sunday: f64 = solution
        .manufactured_batches()
        .filter(|b| b.date == date(1, 5))
        .map(|b| b.quantity)
        .sum();
    assert!(sunday >= 1000.0 - 1e-3, "sunday production was {sunday}");

    assert_eq!(solution.shipments.len(), 1);
    let shipment = &solution.shipments[0];
    assert_eq!(shipment.truck_id.as_deref(), Some("T-MON"));
    assert_eq!(shipment.departure_date, date(1, 6));
    assert_eq!(shipment.delivery_date, date(1, 7));
    assert!((shipment.quantity - 1000.0).abs() < 1e-3);
}

/// Intermediate-stop truck through the frozen buffer: goods freeze at the
/// buffer, ride a long frozen leg, thaw on arrival, and meet remote demand.
#[test]
fn frozen_buffer_routing_with_thaw_on_arrival() {
    init_tracing();
    let mut input = base_input(
        vec![
            Node::new("6122", "Plant").producing(),
            Node::new("Lineage", "Frozen buffer").hub().with_frozen_storage(),
            Node::new("6125", "Hub X").hub().with_demand(),
            Node::new("6130", "WA breadroom").with_demand(),
        ],
        vec![
            Route::new("r1", "6122", "Lineage", 1, StorageState::Ambient, 0.10),
            Route::new("r2", "Lineage", "6125", 1, StorageState::Ambient, 0.12),
            Route::new("r3", "Lineage", "6130", 7, StorageState::Frozen, 0.40),
        ],
        vec![TruckSchedule::new(
            "T-WED",
            "6122",
            "6125",
            TruckCadence::Weekly(DayOfWeek::Wednesday),
            DepartureWindow::Afternoon,
            14_080.0,
        )
        .via("Lineage")],
    );
    input.forecast.push("6125", "P1", date(1, 10), 200.0); // Friday
    input.forecast.push("6130", "P1", date(1, 16), 500.0); // Thursday
    input.labor_calendar = calendar_over(date(1, 2), date(1, 16), 1400.0);

    let solution = solve_plan(&input).unwrap();

    assert_eq!(solution.status, SolveStatus::Optimal);
    assert!(solution.total_shortage() < 1e-3, "demand behind the buffer went short");

    // The buffer received goods; the fixed bug was exactly this leg staying
    // at zero.
    let into_buffer: f64 = solution
        .shipments
        .iter()
        .filter(|s| s.destination == "Lineage")
        .map(|s| s.quantity)
        .sum();
    assert!(into_buffer >= 700.0 - 1e-2, "into buffer: {into_buffer}");

    // Frozen onward leg, departing the day the truck drops the goods.
    let frozen_out: Vec<_> = solution
        .shipments
        .iter()
        .filter(|s| s.origin == "Lineage" && s.destination == "6130")
        .collect();
    assert_eq!(frozen_out.len(), 1);
    assert_eq!(frozen_out[0].state, StorageState::Frozen);
    assert_eq!(frozen_out[0].departure_date, date(1, 9));
    assert_eq!(frozen_out[0].delivery_date, date(1, 16));
    assert!((frozen_out[0].quantity - 500.0).abs() < 1e-2);
    assert!(frozen_out[0].truck_id.is_none()); // open-carrier leg

    // Hub X is fed by the truck's second leg on Thursday.
    let to_hub: Vec<_> = solution
        .shipments
        .iter()
        .filter(|s| s.destination == "6125")
        .collect();
    assert_eq!(to_hub.len(), 1);
    assert_eq!(to_hub[0].truck_id.as_deref(), Some("T-WED"));
    assert_eq!(to_hub[0].departure_date, date(1, 9));
}

/// A dual-role hub serves its own demand and forwards to a spoke; inbound
/// covers both and nothing accumulates as phantom end-inventory.
#[test]
fn dual_role_hub_drains_completely() {
    init_tracing();
    let mut input = base_input(
        vec![
            Node::new("P", "Plant").producing(),
            Node::new("H", "Hub").hub().with_demand(),
            Node::new("S", "Spoke").with_demand(),
        ],
        vec![
            Route::new("r1", "P", "H", 1, StorageState::Ambient, 0.1),
            Route::new("r2", "H", "S", 1, StorageState::Ambient, 0.1),
        ],
        Vec::new(),
    );
    input.forecast.push("H", "P1", date(1, 8), 2000.0);
    input.forecast.push("S", "P1", date(1, 9), 8000.0);
    input.labor_calendar = calendar_over(date(1, 6), date(1, 9), 1400.0);

    let solution = solve_plan(&input).unwrap();

    assert_eq!(solution.status, SolveStatus::Optimal);
    assert!(solution.total_shortage() < 1e-2);

    let inbound: f64 = solution
        .shipments
        .iter()
        .filter(|s| s.destination == "H")
        .map(|s| s.quantity)
        .sum();
    assert!((inbound - 10_000.0).abs() < 1.0, "inbound to hub: {inbound}");

    // End inventory at the hub is (numerically) zero: local demand and the
    // spoke forward drain everything. The regression this guards against
    // left the full spoke quantity stranded as hub end-inventory.
    let held = solution.inventory_at("H", "P1", date(1, 9), StorageState::Ambient);
    assert!(held < 1.0, "hub held {held} at horizon end");
}

/// Day-of-week enforcement: with service only on Tue/Thu and demand on
/// Monday, shortages absorb the miss when allowed and the model is
/// infeasible (with a diagnostic) when they are not.
#[test]
fn day_of_week_gap_shortage_and_infeasibility() {
    init_tracing();
    let build = || {
        let mut input = base_input(
            vec![
                Node::new("P", "Plant").producing(),
                Node::new("D", "Breadroom").with_demand(),
            ],
            vec![Route::new("r1", "P", "D", 1, StorageState::Ambient, 0.1)],
            vec![
                TruckSchedule::new(
                    "T-TUE",
                    "P",
                    "D",
                    TruckCadence::Weekly(DayOfWeek::Tuesday),
                    DepartureWindow::Morning,
                    5000.0,
                ),
                TruckSchedule::new(
                    "T-THU",
                    "P",
                    "D",
                    TruckCadence::Weekly(DayOfWeek::Thursday),
                    DepartureWindow::Morning,
                    5000.0,
                ),
            ],
        );
        input.forecast.push("D", "P1", date(1, 13), 1000.0); // Monday
        input.labor_calendar = calendar_over(date(1, 11), date(1, 13), 1400.0);
        input
    };

    // Shortages on: the Monday demand goes short because Sat..Mon hold no
    // Tuesday or Thursday departure.
    let solution = solve_plan(&build()).unwrap();
    assert_eq!(solution.status, SolveStatus::Optimal);
    assert!((solution.total_shortage() - 1000.0).abs() < 1e-2);
    assert!(solution.fill_rate < 1e-6);
    assert!(solution.shipments.is_empty());

    // Shortages off: infeasible, with the diagnostic re-solve attached.
    let mut strict = build();
    strict.config.allow_shortages = false;
    match solve_plan(&strict) {
        Err(PlanError::Infeasible { diagnostic }) => {
            let diagnostic = diagnostic.expect("diagnostic shortage solve attached");
            assert!((diagnostic.total_shortage() - 1000.0).abs() < 1e-2);
        }
        other => panic!("expected Infeasible, got {other:?}"),
    }
}

/// A leg longer than the shelf life is filtered with a warning, and demand
/// reachable only through it shows up as shortage.
#[test]
fn shelf_life_filters_leg_and_demand_goes_short() {
    init_tracing();
    let mut input = base_input(
        vec![
            Node::new("P", "Plant").producing(),
            Node::new("D", "Remote breadroom").with_demand(),
        ],
        vec![Route::new("r1", "P", "D", 6, StorageState::Ambient, 0.3)],
        Vec::new(),
    );
    input.shelf_life = ShelfLifeParams {
        max_age_ambient: 5,
        max_age_frozen: 120,
        max_age_thawed: 14,
        min_remaining_at_delivery: 0,
    };
    input.forecast.push("D", "P1", date(1, 15), 800.0);
    input.labor_calendar = calendar_over(date(1, 14), date(1, 15), 1400.0);

    let plan = preprocess(&input, &[]).unwrap();
    assert!(plan.legs.is_empty());
    assert_eq!(plan.diagnostics.in_category("shelf_life").count(), 1);
    assert!(plan
        .diagnostics
        .in_category("coverage")
        .any(|i| i.message.contains("unreachable")));

    let solution = solve_plan(&input).unwrap();
    assert!((solution.total_shortage() - 800.0).abs() < 1e-2);
    assert!(solution.shipments.is_empty());
}

/// A delivery-freshness floor at the full shelf life leaves no window at
/// all: nothing can ever be fresh enough to sell, so demand goes short
/// instead of being quietly met with stock of any age.
#[test]
fn freshness_floor_at_max_age_forces_shortage() {
    init_tracing();
    let mut input = base_input(
        vec![Node::new("N", "Plant & breadroom").producing().with_demand()],
        Vec::new(),
        Vec::new(),
    );
    input.forecast.push("N", "P", date(1, 6), 100.0);
    let mut calendar = LaborCalendar::new();
    calendar.insert(date(1, 6), LaborDay::fixed(12.0, 2.0, 1400.0));
    input.labor_calendar = calendar;
    input.config.min_delivery_remaining_days = Some(input.shelf_life.max_age_ambient);

    let solution = solve_plan(&input).unwrap();

    assert_eq!(solution.status, SolveStatus::Optimal);
    assert!((solution.total_shortage() - 100.0).abs() < 1e-3);
    assert!(solution.fill_rate < 1e-6);
    assert!(solution.total_production < 1e-3);
}

/// Identical inputs produce byte-identical serialized records.
#[test]
fn determinism_byte_identical_reruns() {
    init_tracing();
    let build = || {
        let mut input = base_input(
            vec![
                Node::new("P", "Plant").producing(),
                Node::new("H", "Hub").hub().with_demand(),
            ],
            vec![Route::new("r1", "P", "H", 1, StorageState::Ambient, 0.1)],
            Vec::new(),
        );
        input.forecast.push("H", "P1", date(1, 8), 300.0);
        input.forecast.push("H", "P2", date(1, 9), 150.0);
        input.labor_calendar = calendar_over(date(1, 6), date(1, 9), 1400.0);
        input
    };

    let first = serde_json::to_string(&solve_plan(&build()).unwrap()).unwrap();
    let second = serde_json::to_string(&solve_plan(&build()).unwrap()).unwrap();
    assert_eq!(first, second);
}

/// Serialize, parse back, re-serialize: byte-identical, and every map key
/// on the boundary is a string.
#[test]
fn round_trip_and_key_discipline() {
    init_tracing();
    let mut input = base_input(
        vec![Node::new("N", "Plant & breadroom").producing().with_demand()],
        Vec::new(),
        Vec::new(),
    );
    input.forecast.push("N", "P", date(1, 6), 250.0);
    let mut calendar = LaborCalendar::new();
    calendar.insert(date(1, 6), LaborDay::fixed(12.0, 2.0, 1400.0));
    input.labor_calendar = calendar;

    let solution = solve_plan(&input).unwrap();
    let json = serde_json::to_string(&solution).unwrap();
    let parsed: loafline_plan::OptimizationSolution = serde_json::from_str(&json).unwrap();
    assert_eq!(serde_json::to_string(&parsed).unwrap(), json);

    // Walk the serialized tree: every object key is a plain string and
    // composite inventory keys split into exactly four segments.
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let inventory = value
        .get("inventory_by_node_product_date_state")
        .and_then(|v| v.as_object())
        .expect("inventory map serializes as an object");
    for key in inventory.keys() {
        let segments: Vec<_> = key.split('|').collect();
        assert_eq!(segments.len(), 4, "bad composite key '{key}'");
        assert!(NaiveDate::parse_from_str(segments[2], "%Y-%m-%d").is_ok());
    }
    let labor = value
        .get("labor_hours_by_date")
        .and_then(|v| v.as_object())
        .expect("labor map serializes as an object");
    for key in labor.keys() {
        assert!(NaiveDate::parse_from_str(key, "%Y-%m-%d").is_ok());
    }
}

/// Opening stock becomes a tagged INIT batch, excluded from manufactured
/// aggregations but present for the FEFO hand-off.
#[test]
fn init_batches_are_tagged_not_manufactured() {
    init_tracing();
    let mut input = base_input(
        vec![Node::new("N", "Plant & breadroom")
            .producing()
            .with_demand()
            .with_opening_stock("P", StorageState::Ambient, 40.0)],
        Vec::new(),
        Vec::new(),
    );
    input.forecast.push("N", "P", date(1, 6), 100.0);
    let mut calendar = LaborCalendar::new();
    calendar.insert(date(1, 6), LaborDay::fixed(12.0, 2.0, 1400.0));
    input.labor_calendar = calendar;

    let solution = solve_plan(&input).unwrap();

    let init: Vec<_> = solution
        .production_batches
        .iter()
        .filter(|b| b.kind == BatchKind::InitialInventory)
        .collect();
    assert_eq!(init.len(), 1);
    assert!((init[0].quantity - 40.0).abs() < 1e-6);

    // Opening stock offsets production: only 60 units are manufactured.
    let manufactured: f64 = solution.manufactured_batches().map(|b| b.quantity).sum();
    assert!((manufactured - 60.0).abs() < 1e-2);
    assert!((solution.total_production - 60.0).abs() < 1e-2);
}
