use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use ow_app::{
    AppError, AppResult, ProcessCoordinator, RunProgressEvent, WorkbookQuery, load_config,
};
use ow_history::HistoryStore;
use ow_report::AepSummary;
use ow_script::{EnergyCapture, Operation, OutputFields, Script, WriteOptions, save_script};
use ow_turbine::{TurbineCatalog, TurbineLayout};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ow-cli")]
#[command(about = "Drive the Openwind engine through scripts and file handshakes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a control script
    NewScript {
        /// Where to write the script
        output: PathBuf,
        /// Report path written into the script
        #[arg(long, default_value = "report.txt")]
        report: String,
        /// Workbook to open first
        #[arg(long)]
        workbook: Option<String>,
        /// Turbine type to replace, with --turbine-file
        #[arg(long, requires = "turbine_file")]
        turbine_name: Option<String>,
        /// OWTG file holding the replacement turbine
        #[arg(long, requires = "turbine_name")]
        turbine_file: Option<String>,
        #[arg(long, default_value = ow_script::DEFAULT_WAKE_MODEL)]
        wake_model: String,
        /// Add an Optimise operation with this many iterations
        #[arg(long)]
        optimise: Option<u32>,
        /// Ask for turbine X/Y columns in the report
        #[arg(long)]
        positions: bool,
    },
    /// Summarize a control script and how it must be driven
    InspectScript {
        script: PathBuf,
    },
    /// Parse an energy capture report
    ParseReport {
        report: PathBuf,
        /// Print every turbine row
        #[arg(long)]
        rows: bool,
    },
    /// Parse an interactive results file
    ParseResults {
        results: PathBuf,
    },
    /// Inspect or modify OWTG turbine files
    #[command(subcommand)]
    Turbine(TurbineCommands),
    /// Run a script to completion and read its report
    Run {
        /// Coordinator config (YAML)
        config: PathBuf,
    },
    /// Drive interactive rounds, one per positions file
    Iterate {
        /// Coordinator config (YAML)
        config: PathBuf,
        /// Positions files (`x y` per line), one round each
        #[arg(required = true)]
        positions: Vec<PathBuf>,
        /// Turbine placed at every position; defaults to the file the script replaces
        #[arg(long)]
        turbine: Option<PathBuf>,
    },
    /// Read turbine positions and baseline energy from a workbook
    Workbook {
        workbook: PathBuf,
        /// Engine executable; discovered when absent
        #[arg(long)]
        engine: Option<PathBuf>,
        /// Keep the generated script and report
        #[arg(long)]
        keep_files: bool,
    },
    /// List history sessions, or the rounds of one session
    History {
        /// History directory
        dir: PathBuf,
        session_id: Option<String>,
    },
}

#[derive(Subcommand)]
enum TurbineCommands {
    /// Print the definition held in an OWTG file
    Show { path: PathBuf },
    /// Copy an OWTG file with a new rotor diameter
    SetDiameter {
        src: PathBuf,
        dst: PathBuf,
        /// Rotor diameter in metres
        diameter_m: f64,
    },
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::NewScript {
            output,
            report,
            workbook,
            turbine_name,
            turbine_file,
            wake_model,
            optimise,
            positions,
        } => {
            let mut script = Script::new(report);
            script.fields = OutputFields::default().with_positions(positions);
            if let Some(path) = workbook {
                script.add_operation(Operation::ChangeWorkbook { path });
            }
            if let (Some(name), Some(path)) = (turbine_name, turbine_file) {
                script.add_operation(Operation::ReplaceTurbineType { name, path });
            }
            script.add_operation(Operation::EnergyCapture(EnergyCapture::new(wake_model)));
            if let Some(n) = optimise {
                script.add_operation(Operation::Optimize { iterations: Some(n) });
            }
            script.add_operation(Operation::Exit);
            cmd_new_script(&output, &script)
        }
        Commands::InspectScript { script } => cmd_inspect_script(&script),
        Commands::ParseReport { report, rows } => cmd_parse_report(&report, rows),
        Commands::ParseResults { results } => cmd_parse_results(&results),
        Commands::Turbine(turbine_cmd) => match turbine_cmd {
            TurbineCommands::Show { path } => cmd_turbine_show(&path),
            TurbineCommands::SetDiameter {
                src,
                dst,
                diameter_m,
            } => cmd_turbine_set_diameter(&src, &dst, diameter_m),
        },
        Commands::Run { config } => cmd_run(&config),
        Commands::Iterate {
            config,
            positions,
            turbine,
        } => cmd_iterate(&config, &positions, turbine.as_deref()),
        Commands::Workbook {
            workbook,
            engine,
            keep_files,
        } => cmd_workbook(&workbook, engine, keep_files),
        Commands::History { dir, session_id } => cmd_history(&dir, session_id.as_deref()),
    }
}

fn to_yaml<T: serde::Serialize>(value: &T) -> AppResult<String> {
    serde_yaml::to_string(value).map_err(|e| AppError::Parse(e.to_string()))
}

fn cmd_new_script(output: &Path, script: &Script) -> AppResult<()> {
    save_script(output, script, WriteOptions::engine())?;
    println!(
        "✓ Wrote {} ({} operations)",
        output.display(),
        script.operations.len()
    );
    Ok(())
}

fn cmd_inspect_script(path: &Path) -> AppResult<()> {
    let info = ow_script::read_script_info(path)?;
    let policy = ow_script::classify(&info);
    print!("{}", to_yaml(&info)?);
    println!("flow: {:?}", policy.flow);
    match policy.start_once_blocker {
        Some(blocker) => println!("start_once: not allowed ({blocker:?})"),
        None => println!("start_once: allowed"),
    }
    Ok(())
}

fn print_summary(summary: &AepSummary) {
    println!(
        "  Turbines: {} ({} active)",
        summary.turbine_count, summary.active_count
    );
    println!("  Gross:   {:.4} GWh", summary.gross_gwh);
    if let Some(array) = summary.array_gwh {
        println!("  Array:   {:.4} GWh", array);
    }
    println!("  Net:     {:.4} GWh", summary.net_gwh);
    if let Some(eff) = summary.array_efficiency() {
        println!("  Array efficiency: {:.2}%", 100.0 * eff);
    }
}

fn cmd_parse_report(path: &Path, rows: bool) -> AppResult<()> {
    let report = ow_report::read_report(path)?;
    println!("Report: {}", path.display());
    print_summary(&report.summary);
    for line in &report.engine_errors {
        println!("  ! {}", line);
    }
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
    if rows {
        println!("\n{:>5} {:>12} {:>12} {:>14} {:>14}", "Index", "X[m]", "Y[m]", "Gross [kWh]", "Net [kWh]");
        for r in &report.records {
            let num = |v: Option<f64>| v.map(|v| format!("{v:.1}")).unwrap_or_else(|| "-".to_string());
            println!(
                "{:>5} {:>12} {:>12} {:>14} {:>14}",
                r.index.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string()),
                num(r.x),
                num(r.y),
                num(r.gross_kwh),
                num(r.net_kwh)
            );
        }
    }
    Ok(())
}

fn cmd_parse_results(path: &Path) -> AppResult<()> {
    let results = ow_report::read_results(path)?;
    println!("Results: {}", path.display());
    print_summary(&results.summary());
    for (i, (net, gross)) in results
        .net_by_turbine
        .iter()
        .zip(&results.gross_by_turbine)
        .enumerate()
    {
        println!("  {:>4}  net={:.1} kWh  gross={:.1} kWh", i + 1, net, gross);
    }
    Ok(())
}

fn cmd_turbine_show(path: &Path) -> AppResult<()> {
    let owtg = ow_turbine::read_owtg(path)?;
    println!("{} - {}", owtg.name, owtg.description);
    print!("{}", to_yaml(&owtg.definition)?);
    Ok(())
}

fn cmd_turbine_set_diameter(src: &Path, dst: &Path, diameter_m: f64) -> AppResult<()> {
    ow_turbine::set_rotor_diameter(src, dst, diameter_m)?;
    println!("✓ Wrote {} (rotor diameter {} m)", dst.display(), diameter_m);
    Ok(())
}

fn clear_progress_line() {
    print!("\r{}\r", " ".repeat(100));
    let _ = io::stdout().flush();
}

fn render_cli_progress(event: &RunProgressEvent) {
    let spinner = ['|', '/', '-', '\\'];
    let spin_idx = ((event.elapsed_wall_s * 10.0) as usize) % spinner.len();
    let mut line = format!(
        "\r{} {}  elapsed={:.2}s",
        spinner[spin_idx],
        event.stage.label(),
        event.elapsed_wall_s
    );
    if let Some(iter) = event.iteration {
        line.push_str(&format!("  round={}", iter));
    }
    if let Some(msg) = &event.message {
        line.push_str(&format!("  {}", msg));
    }
    print!("{}", line);
    let _ = io::stdout().flush();
}

/// Progress callback that redraws on stage changes, at most every 100 ms otherwise.
fn throttled_progress() -> impl FnMut(RunProgressEvent) {
    let mut last_emit = Instant::now();
    let mut last_stage = None;
    move |event: RunProgressEvent| {
        if last_stage != Some(event.stage) || last_emit.elapsed().as_millis() >= 100 {
            render_cli_progress(&event);
            last_stage = Some(event.stage);
            last_emit = Instant::now();
        }
    }
}

fn cmd_run(config_path: &Path) -> AppResult<()> {
    let config = load_config(config_path)?;
    let mut coordinator = ProcessCoordinator::prepare(config)?;
    tracing::debug!(config = %config_path.display(), "config loaded");
    println!("Running {}", coordinator.paths().script.display());

    let mut progress = throttled_progress();
    let outcome = coordinator.run_to_completion(Some(&mut progress))?;
    clear_progress_line();

    println!("✓ Engine finished in {:.1}s", outcome.elapsed_s);
    print_summary(&outcome.report.summary);
    println!(
        "  Net after losses: {:.4} GWh (availability {}, other losses {})",
        outcome.adjusted.net_gwh, outcome.adjusted.losses.availability, outcome.adjusted.losses.other_losses
    );
    Ok(())
}

fn cmd_iterate(config_path: &Path, position_files: &[PathBuf], turbine: Option<&Path>) -> AppResult<()> {
    let config = load_config(config_path)?;
    let mut coordinator = ProcessCoordinator::prepare(config)?;

    let turbine_path = match turbine {
        Some(p) => p.to_path_buf(),
        None => coordinator.paths().turbine_file.clone().ok_or_else(|| {
            AppError::Configuration(
                "the script replaces no turbine type; pass --turbine".to_string(),
            )
        })?,
    };
    let owtg = ow_turbine::read_owtg(&turbine_path)?;
    let mut catalog = TurbineCatalog::new();
    let type_id = catalog.add(owtg.description.clone(), owtg.definition);
    tracing::info!(
        turbine = %turbine_path.display(),
        rounds = position_files.len(),
        "starting interactive rounds"
    );

    let mut progress = throttled_progress();
    let mut result = Ok(());
    for path in position_files {
        let positions = match ow_turbine::read_positions(path) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "cannot read positions");
                result = Err(e.into());
                break;
            }
        };
        let layout = TurbineLayout::uniform(positions, type_id);
        match coordinator.run_iteration(&layout, &catalog, Some(&mut progress)) {
            Ok(outcome) => {
                clear_progress_line();
                println!(
                    "✓ Round {} ({}): net {:.4} GWh, gross {:.4} GWh, {:.1}s",
                    outcome.iteration,
                    path.display(),
                    outcome.summary.net_gwh,
                    outcome.summary.gross_gwh,
                    outcome.elapsed_s
                );
                for line in &outcome.engine_errors {
                    tracing::warn!(round = outcome.iteration, "{line}");
                }
            }
            Err(e) => {
                clear_progress_line();
                tracing::error!(path = %path.display(), error = %e, "round failed");
                result = Err(e);
                break;
            }
        }
    }

    coordinator.terminate()?;
    if let Some(id) = coordinator.history_session() {
        println!("History session: {}", id);
    }
    result
}

fn cmd_workbook(workbook: &Path, engine: Option<PathBuf>, keep_files: bool) -> AppResult<()> {
    let query = WorkbookQuery {
        engine,
        keep_files,
        ..WorkbookQuery::default()
    };
    let report = ow_app::evaluate_workbook(workbook, &query)?;
    let positions = ow_app::positions_from_report(&report)?;
    println!("Workbook: {}", workbook.display());
    print_summary(&report.summary);
    println!("\nPositions:");
    for p in &positions {
        println!("  {:.1}\t{:.1}", p.x, p.y);
    }
    Ok(())
}

fn cmd_history(dir: &Path, session_id: Option<&str>) -> AppResult<()> {
    let store = HistoryStore::new(dir.to_path_buf())?;
    match session_id {
        None => {
            let sessions = store.list_sessions()?;
            if sessions.is_empty() {
                println!("No sessions in {}", dir.display());
            }
            for m in sessions {
                println!("  {} ({}, {}) {}", m.session_id, m.created, m.mode, m.script);
            }
        }
        Some(id) => {
            let manifest = store.load_manifest(id)?;
            println!("Session {} - {}", manifest.session_id, manifest.script);
            for r in store.load_iterations(id)? {
                println!(
                    "  {:>4}  net={:.4} GWh  gross={:.4} GWh  turbines={}  {}",
                    r.iteration,
                    r.net_gwh,
                    r.gross_gwh,
                    r.positions.len(),
                    r.timestamp
                );
            }
        }
    }
    Ok(())
}
