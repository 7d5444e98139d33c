//! Coordinator tests against a shell stand-in for the engine.
#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, SystemTime};

use ow_app::*;
use ow_script::{EnergyCapture, Operation, Script, WriteOptions, save_script};
use ow_turbine::{Position, TurbineCatalog, TurbineDefinition, TurbineLayout};

struct ShellEngine;

impl EngineSpawner for ShellEngine {
    fn spawn(&self, engine: &Path, script: &Path, work_dir: &Path) -> std::io::Result<Child> {
        Command::new("sh")
            .arg(engine)
            .arg(script)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .spawn()
    }
}

/// Answers the start-up evaluation, then every ready file, with one
/// results line per pushed position.
const INTERACTIVE_ENGINE: &str = r#"
answer() {
    n=$(grep -c . positions.txt 2>/dev/null || echo 2)
    {
        printf '%s\tturbines\tNetEnergy=\t%s\tcurrentNet\tcurrentGross\tbestNet\n' "$n" "$((n * 90))"
        i=0
        while [ "$i" -lt "$n" ]; do
            printf '90.0\t100.0\t90.0\n'
            i=$((i + 1))
        done
    } > results.tmp
    mv results.tmp results.txt
}
answer
while true; do
    if [ -f notifyOW.txt ]; then
        rm -f notifyOW.txt
        sleep 0.05
        answer
    fi
    sleep 0.02
done
"#;

const SILENT_AFTER_START_ENGINE: &str = r#"
printf '1\tturbines\tNetEnergy=\t1.0\n1.0\t1.0\n' > results.txt
sleep 30
"#;

const REPORTING_ENGINE: &str = "printf 'Site\\tIndex\\tX[m]\\tY[m]\\tGross [kWh]\\tNet [kWh]\\tArray Efficiency [%%]\\n\
S\\t1\\t100.0\\t200.0\\t1000.0\\t900.0\\t90.0\\n\
S\\t2\\t300.0\\t400.0\\t0.0\\t0.0\\t0.0\\n' > report.txt
";

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new(engine_body: &str, operations: Vec<Operation>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("plant.blb"), "workbook").unwrap();
        fs::write(dir.path().join("engine.sh"), engine_body).unwrap();
        let mut script = Script::new("report.txt");
        for op in operations {
            script.add_operation(op);
        }
        save_script(&dir.path().join("run.xml"), &script, WriteOptions::engine()).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self) -> CoordinatorConfig {
        let mut config = CoordinatorConfig::new(self.path("engine.sh"), self.path("run.xml"));
        config.timeout_s = Some(10.0);
        config.poll_interval_ms = 20;
        config
    }

    fn coordinator(&self, config: CoordinatorConfig) -> AppResult<ProcessCoordinator> {
        ProcessCoordinator::with_spawner(config, Box::new(ShellEngine))
    }
}

/// Write `text` to `path` with a modification time a minute in the past.
fn write_stale(path: &Path, text: &str) {
    fs::write(path, text).unwrap();
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(60)).unwrap();
}

fn optimise_ops() -> Vec<Operation> {
    vec![
        Operation::ChangeWorkbook {
            path: "plant.blb".into(),
        },
        Operation::EnergyCapture(EnergyCapture::default()),
        Operation::Optimize {
            iterations: Some(40),
        },
        Operation::Exit,
    ]
}

fn definition() -> TurbineDefinition {
    TurbineDefinition {
        hub_height_m: 80.0,
        rotor_diameter_m: 90.0,
        rated_power_kw: 2000.0,
        cut_in_ms: 4.0,
        cut_out_ms: 25.0,
        blade_count: 3,
        velocities_ms: vec![4.0, 10.0, 25.0],
        power_kw: vec![50.0, 1500.0, 2000.0],
        thrust_coefficient: vec![0.8, 0.7, 0.1],
        rotor_rpm: vec![9.0, 14.0, 16.0],
        air_density_kg_m3: 1.225,
    }
}

fn layout(catalog: &mut TurbineCatalog, n: usize) -> TurbineLayout {
    let id = catalog.add("V90", definition());
    let positions = (0..n)
        .map(|i| Position::new(1000.0 + 250.0 * i as f64, 5000.0))
        .collect();
    TurbineLayout::uniform(positions, id)
}

#[test]
fn per_iteration_rounds_spawn_and_stop_the_engine() {
    let fx = Fixture::new(INTERACTIVE_ENGINE, optimise_ops());
    let mut config = fx.config();
    config.history_dir = Some(fx.path("history"));
    let mut coordinator = fx.coordinator(config).unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::NotStarted);

    let mut catalog = TurbineCatalog::new();
    let layout = layout(&mut catalog, 3);
    let mut stages = Vec::new();
    let mut on_progress = |e: RunProgressEvent| stages.push(e.stage);

    let outcome = coordinator
        .run_iteration(&layout, &catalog, Some(&mut on_progress))
        .unwrap();
    assert_eq!(outcome.iteration, 1);
    assert_eq!(outcome.results.turbine_count, 3);
    assert_eq!(outcome.records.len(), 3);
    assert!((outcome.summary.net_gwh - 270.0 / 1e6).abs() < 1e-12);
    assert_eq!(coordinator.engine_pid(), None);
    assert_eq!(coordinator.state(), CoordinatorState::Running);

    let second = coordinator.run_iteration(&layout, &catalog, None).unwrap();
    assert_eq!(second.iteration, 2);

    assert_eq!(stages.first(), Some(&RunStage::Classifying));
    assert!(stages.contains(&RunStage::InitialEvaluation));
    assert!(stages.contains(&RunStage::Terminating));
    assert_eq!(stages.last(), Some(&RunStage::Completed));

    let positions = fs::read_to_string(fx.path("positions.txt")).unwrap();
    assert_eq!(positions.lines().count(), 3);

    let session = coordinator.history_session().unwrap().to_string();
    let store = ow_history::HistoryStore::new(fx.path("history")).unwrap();
    let logged = store.load_iterations(&session).unwrap();
    assert_eq!(logged.len(), 2);
    assert_eq!(logged[0].positions.len(), 3);

    coordinator.terminate().unwrap();
    coordinator.terminate().unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::Terminated);
    assert!(matches!(
        coordinator.run_iteration(&layout, &catalog, None),
        Err(AppError::InvalidState(_))
    ));
}

#[test]
fn start_once_reuses_one_engine() {
    let fx = Fixture::new(INTERACTIVE_ENGINE, optimise_ops());
    let mut config = fx.config();
    config.mode = LaunchMode::StartOnce;
    let mut coordinator = fx.coordinator(config).unwrap();

    let mut catalog = TurbineCatalog::new();
    let layout = layout(&mut catalog, 2);
    coordinator.run_iteration(&layout, &catalog, None).unwrap();
    let pid = coordinator.engine_pid().unwrap();
    let second = coordinator.run_iteration(&layout, &catalog, None).unwrap();
    assert_eq!(coordinator.engine_pid(), Some(pid));
    assert_eq!(second.results.net_energy_kwh, 180.0);
    coordinator.terminate().unwrap();
    assert_eq!(coordinator.engine_pid(), None);
}

#[test]
fn turbine_replacement_rewrites_owtg_and_blocks_start_once() {
    let mut ops = optimise_ops();
    ops.insert(
        1,
        Operation::ReplaceTurbineType {
            name: "T1".into(),
            path: "t1.owtg".into(),
        },
    );
    let fx = Fixture::new(INTERACTIVE_ENGINE, ops);

    let mut config = fx.config();
    config.mode = LaunchMode::StartOnce;
    assert!(matches!(
        fx.coordinator(config),
        Err(AppError::Configuration(_))
    ));

    let mut coordinator = fx.coordinator(fx.config()).unwrap();
    let mut catalog = TurbineCatalog::new();
    let layout = layout(&mut catalog, 2);
    coordinator.run_iteration(&layout, &catalog, None).unwrap();

    let written = ow_turbine::read_owtg(&fx.path("t1.owtg")).unwrap();
    assert_eq!(written.name, "T1");
    assert_eq!(written.description, "V90");
    assert_eq!(written.definition.rotor_diameter_m, 90.0);
    assert_eq!(written.definition.power_kw, definition().power_kw);
}

#[test]
fn silent_engine_times_out_and_keeps_the_handle() {
    let fx = Fixture::new(SILENT_AFTER_START_ENGINE, optimise_ops());
    let mut config = fx.config();
    config.timeout_s = Some(0.5);
    let mut coordinator = fx.coordinator(config).unwrap();

    let mut catalog = TurbineCatalog::new();
    let layout = layout(&mut catalog, 1);
    let err = coordinator.run_iteration(&layout, &catalog, None).unwrap_err();
    assert!(matches!(err, AppError::EngineTimeout { .. }), "{err}");
    assert!(err.to_string().contains("results.txt"));
    assert!(coordinator.engine_pid().is_some());

    coordinator.terminate().unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::Terminated);
}

#[test]
fn interactive_round_needs_an_optimise_operation() {
    let fx = Fixture::new(
        REPORTING_ENGINE,
        vec![
            Operation::EnergyCapture(EnergyCapture::default()),
            Operation::Exit,
        ],
    );
    let mut coordinator = fx.coordinator(fx.config()).unwrap();
    let mut catalog = TurbineCatalog::new();
    let layout = layout(&mut catalog, 1);
    let err = coordinator.run_iteration(&layout, &catalog, None).unwrap_err();
    assert!(matches!(err, AppError::ScriptValidation(_)));
    assert_eq!(coordinator.engine_pid(), None);
}

#[test]
fn run_to_completion_reads_the_report() {
    let fx = Fixture::new(
        REPORTING_ENGINE,
        vec![
            Operation::ChangeWorkbook {
                path: "plant.blb".into(),
            },
            Operation::EnergyCapture(EnergyCapture::default()),
            Operation::Exit,
        ],
    );
    let mut coordinator = fx.coordinator(fx.config()).unwrap();
    let outcome = coordinator.run_to_completion(None).unwrap();
    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(outcome.report.records.len(), 2);
    assert_eq!(outcome.report.summary.active_count, 1);
    assert!((outcome.report.summary.net_gwh - 900.0 / 1e6).abs() < 1e-12);
    assert!((outcome.adjusted.net_gwh - 0.95 * 900.0 / 1e6).abs() < 1e-12);
    assert_eq!(coordinator.state(), CoordinatorState::Terminated);
}

#[test]
fn engine_failure_lines_are_fatal_by_default() {
    let engine = "printf 'Failed to find and replace turbine type T1 with t1.owtg\\n\
Site\\tIndex\\tGross [kWh]\\tNet [kWh]\\nS\\t1\\t10\\t9\\n' > report.txt\n";
    let ops = vec![Operation::EnergyCapture(EnergyCapture::default()), Operation::Exit];

    let fx = Fixture::new(engine, ops.clone());
    let err = fx
        .coordinator(fx.config())
        .unwrap()
        .run_to_completion(None)
        .unwrap_err();
    assert!(matches!(err, AppError::EngineReportedFailure { count: 1, .. }));

    let fx = Fixture::new(engine, ops);
    let mut config = fx.config();
    config.fail_on_engine_errors = false;
    let outcome = fx.coordinator(config).unwrap().run_to_completion(None).unwrap();
    assert_eq!(outcome.report.engine_error_count(), 1);
}

#[test]
fn preflight_rejects_missing_files() {
    let fx = Fixture::new(INTERACTIVE_ENGINE, optimise_ops());

    let mut config = fx.config();
    config.engine = Some(fx.path("missing.exe"));
    assert!(matches!(fx.coordinator(config), Err(AppError::Configuration(_))));

    let mut config = fx.config();
    config.script = fx.path("missing.xml");
    assert!(matches!(fx.coordinator(config), Err(AppError::Configuration(_))));

    fs::remove_file(fx.path("plant.blb")).unwrap();
    let err = fx.coordinator(fx.config()).err().unwrap();
    assert!(err.to_string().contains("plant.blb"));
}

#[test]
fn workbook_query_reads_positions_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let workbook = dir.path().join("plant.blb");
    fs::write(&workbook, "workbook").unwrap();
    let engine = dir.path().join("engine.sh");
    // the query report is written next to the workbook under a fixed name
    fs::write(&engine, REPORTING_ENGINE.replace("report.txt", "gtpReport.txt")).unwrap();

    let query = WorkbookQuery {
        engine: Some(engine),
        timeout_s: Some(10.0),
        ..WorkbookQuery::default()
    };
    let report = evaluate_workbook_with(&workbook, &query, Box::new(ShellEngine)).unwrap();
    let positions = positions_from_report(&report).unwrap();
    assert_eq!(
        positions,
        vec![Position::new(100.0, 200.0), Position::new(300.0, 400.0)]
    );
    assert!(!dir.path().join("gtpScript.xml").exists());
    assert!(!dir.path().join("gtpReport.txt").exists());
}

#[test]
fn engine_that_leaves_the_report_untouched_is_a_process_failure() {
    let fx = Fixture::new(
        "exit 7\n",
        vec![Operation::EnergyCapture(EnergyCapture::default()), Operation::Exit],
    );
    // a complete report from some earlier run
    write_stale(
        &fx.path("report.txt"),
        "Site\tIndex\tGross [kWh]\tNet [kWh]\nS\t1\t1000\t900\n",
    );

    let mut coordinator = fx.coordinator(fx.config()).unwrap();
    let err = coordinator.run_to_completion(None).unwrap_err();
    assert!(matches!(err, AppError::Process(_)), "{err}");
    let message = err.to_string();
    assert!(message.contains("report.txt"), "{message}");
    assert!(message.contains('7'), "{message}");
    assert_eq!(coordinator.state(), CoordinatorState::Terminated);
}

#[test]
fn only_reports_written_since_spawn_are_scanned() {
    let fx = Fixture::new(INTERACTIVE_ENGINE, optimise_ops());
    write_stale(
        &fx.path("report.txt"),
        "Failed to find and replace turbine type OLD with old.owtg\n",
    );
    let mut config = fx.config();
    config.mode = LaunchMode::StartOnce;
    config.fail_on_engine_errors = false;
    let mut coordinator = fx.coordinator(config).unwrap();

    let mut catalog = TurbineCatalog::new();
    let layout = layout(&mut catalog, 2);
    let first = coordinator.run_iteration(&layout, &catalog, None).unwrap();
    assert!(first.engine_errors.is_empty());

    // the running engine rewrites its report between rounds
    fs::write(
        fx.path("report.txt"),
        "Failed to find and replace turbine type T1 with t1.owtg\n",
    )
    .unwrap();
    let second = coordinator.run_iteration(&layout, &catalog, None).unwrap();
    assert_eq!(second.engine_errors.len(), 1);

    let third = coordinator.run_iteration(&layout, &catalog, None).unwrap();
    assert!(third.engine_errors.is_empty());
    coordinator.terminate().unwrap();
}

#[test]
fn stale_report_failures_do_not_abort_a_round() {
    let fx = Fixture::new(INTERACTIVE_ENGINE, optimise_ops());
    write_stale(
        &fx.path("report.txt"),
        "Failed to find and replace turbine type OLD with old.owtg\n",
    );
    let mut coordinator = fx.coordinator(fx.config()).unwrap();

    let mut catalog = TurbineCatalog::new();
    let layout = layout(&mut catalog, 2);
    let outcome = coordinator.run_iteration(&layout, &catalog, None).unwrap();
    assert!(outcome.engine_errors.is_empty());
    assert_eq!(coordinator.state(), CoordinatorState::Running);
}

#[test]
fn cancelled_round_ends_the_session() {
    let fx = Fixture::new(INTERACTIVE_ENGINE, optimise_ops());
    let mut config = fx.config();
    config.mode = LaunchMode::StartOnce;
    let mut coordinator = fx.coordinator(config).unwrap();
    coordinator.cancel_token().cancel();

    let mut catalog = TurbineCatalog::new();
    let layout = layout(&mut catalog, 2);
    let err = coordinator.run_iteration(&layout, &catalog, None).unwrap_err();
    assert!(matches!(err, AppError::Cancelled(_)), "{err}");
    assert_eq!(coordinator.state(), CoordinatorState::Terminated);
    assert_eq!(coordinator.engine_pid(), None);

    // a tripped token cannot poison a later round
    assert!(matches!(
        coordinator.run_iteration(&layout, &catalog, None),
        Err(AppError::InvalidState(_))
    ));
}
