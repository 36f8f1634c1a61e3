use mathsheet_core::{CellOutput, Dispatcher, MemoryStore, PlotConfig, SheetService};

async fn eval(d: &Dispatcher, sheet: &str, input: &str) -> CellOutput {
    let mut out = CellOutput::default();
    d.process_input(input, sheet, 1, &mut out).await;
    out
}

#[tokio::test]
async fn sheets_do_not_share_bindings() {
    let d = Dispatcher::default();
    assert_eq!(eval(&d, "a", "x = 5").await, CellOutput::Text("x = 5".into()));
    assert_eq!(
        eval(&d, "b", "x").await,
        CellOutput::Error("Undefined symbol x".into())
    );
    assert_eq!(eval(&d, "a", "x").await, CellOutput::Text("x = 5".into()));
}

#[tokio::test]
async fn help_is_idempotent() {
    let d = Dispatcher::default();
    eval(&d, "s", "f(x) = x + 1").await;
    let first = eval(&d, "s", "help").await;
    let second = eval(&d, "s", "help").await;
    assert_eq!(first, second);
    assert!(first.display_text().contains("f(x) = x + 1"));
}

#[tokio::test]
async fn function_definition_round_trips_original_text() {
    let d = Dispatcher::default();
    eval(&d, "s", "f(x) = x^2 + 1").await;
    assert_eq!(eval(&d, "s", "f").await, CellOutput::Text("f(x) = x^2 + 1".into()));
}

#[tokio::test]
async fn clear_forgets_definitions() {
    let d = Dispatcher::default();
    eval(&d, "s", "x = 2").await;
    assert!(!eval(&d, "s", "cls").await.is_error());
    assert_eq!(
        eval(&d, "s", "x").await,
        CellOutput::Error("Undefined symbol x".into())
    );
}

#[test]
fn plot_lines_resolve_to_configs() {
    let config = PlotConfig::parse("plot {x^2, sin(x)} from -5 to 5").unwrap();
    assert_eq!(config.functions, vec!["x^2", "sin(x)"]);
    assert_eq!((config.x_min, config.x_max, config.steps), (-5.0, 5.0, 200));
    assert_eq!(PlotConfig::parse("plot {} from 0 to 1"), None);
    assert_eq!(PlotConfig::parse("plot x^2 from 0 to 1"), None);
}

#[tokio::test]
async fn plot_command_delivers_config() {
    let d = Dispatcher::default();
    let CellOutput::Plot(config) = eval(&d, "s", "plot {x^2} from -1 to 1").await else {
        panic!("expected a plot");
    };
    assert_eq!(config.functions, vec!["x^2"]);

    let CellOutput::Error(message) = eval(&d, "s", "plot {x} from 2 to 1").await else {
        panic!("expected an error");
    };
    assert!(message.contains("Plot usage"));
}

#[tokio::test]
async fn commands_shadow_variables_with_the_same_name() {
    let d = Dispatcher::default();
    eval(&d, "s", "clear = 1").await;
    let out = eval(&d, "s", "clear").await;
    assert_eq!(
        out,
        CellOutput::Text("Memory cleared. All functions and variables have been removed.".into())
    );
}

#[tokio::test]
async fn matrix_determinant() {
    let d = Dispatcher::default();
    let out = eval(&d, "s", "matrix det [[2,3],[1,4]]").await;
    assert!(out.display_text().contains('5'));
}

#[tokio::test]
async fn failed_evaluations_leave_state_untouched() {
    let d = Dispatcher::default();
    eval(&d, "s", "a = 1").await;
    eval(&d, "s", "g(t) = a * t").await;
    let before = d.state().snapshot("s");

    for input in ["a = nope", "g(1, 2)", "e = 3", "solve x = for x", "derive sin(x) for"] {
        eval(&d, "s", input).await;
        assert_eq!(d.state().snapshot("s"), before, "state changed after {input:?}");
    }
}

#[tokio::test]
async fn sheet_service_end_to_end() {
    let service = SheetService::new(MemoryStore::new(), Default::default());
    let sheet = service.initialize().unwrap();
    service.add_cell(&sheet.id, "r = 3").await.unwrap();
    service.add_cell(&sheet.id, "area(r) = pi * r^2").await.unwrap();
    let cell = service.add_cell(&sheet.id, "solve x^2 - 4 = 0 for x").await.unwrap();
    assert_eq!(cell.output, CellOutput::Text("x = -2, 2".into()));
    assert_eq!(cell.cell_number, 3);

    let derived = service.add_cell(&sheet.id, "derive x^2 x").await.unwrap();
    assert!(derived.output.display_text().starts_with("Derivative of x^2 with respect to x"));

    let other = service.create_sheet(None).unwrap();
    let cell = service.add_cell(&other.id, "r").await.unwrap();
    assert!(cell.output.is_error());
}
