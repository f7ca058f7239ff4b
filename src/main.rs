// Entry point and interactive control loop.
//
// The menu owns the session (loaded events plus an optional capacity
// configuration) and re-runs the pure analysis every time reports are
// requested:
// - Option [1] loads and normalizes the absence file, printing diagnostics.
// - Option [2] loads a JSON capacity configuration.
// - Option [3] runs the analysis, previews it and exports the sheet.
// - Option [4] writes the configuration in effect back to JSON.
mod aggregate;
mod analysis;
mod capacity;
mod config;
mod error;
mod filter;
mod loader;
mod output;
mod types;
mod util;

use aggregate::{AggregationOptions, Mode};
use capacity::CapacityModel;
use config::CapacityConfig;
use error::{ConfigError, RangeError};
use filter::Selection;
use loader::LoadReport;
use once_cell::sync::Lazy;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use types::{AbsenceEvent, DateRange};

const DEFAULT_DATA_PATH: &str = "ausencias.csv";
const DEFAULT_CONFIG_PATH: &str = "configuracion_absentismo.json";
const PREVIEW_ROWS: usize = 12;

// Loaded once per session, reused by every report run.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| {
    Mutex::new(AppState {
        data: None,
        config: None,
    })
});

struct AppState {
    data: Option<(Vec<AbsenceEvent>, LoadReport)>,
    config: Option<CapacityConfig>,
}

/// Everything `analysis::analyze` needs, resolved from the session.
struct Inputs {
    capacity: CapacityModel,
    selection: Selection,
    ranges: Vec<Result<DateRange, RangeError>>,
    options: AggregationOptions,
}

fn state() -> MutexGuard<'static, AppState> {
    APP_STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_choice() -> String {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Ask for a path, falling back to `default` on an empty answer.
fn read_path(label: &str, default: &str) -> String {
    print!("{} [{}]: ", label, default);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    let answer = buf.trim();
    if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    }
}

fn handle_load() {
    let path = read_path("Absence file", DEFAULT_DATA_PATH);
    match loader::load_and_clean(&path) {
        Ok((events, report)) => {
            println!(
                "Processing dataset... ({} rows read, {} absences loaded)",
                util::format_int(report.total_rows),
                util::format_int(report.loaded_rows)
            );
            for d in report.diagnostics() {
                println!("Note: {}.", d);
            }
            if report.has_end_column && report.missing_end > 0 {
                println!(
                    "Info: {} absences have no end timestamp.",
                    util::format_int(report.missing_end)
                );
            }
            let mode = Mode::for_columns(report.has_end_column);
            println!("Computation mode available: {}.\n", mode.label());
            state().data = Some((events, report));
        }
        Err(e) => {
            eprintln!("Failed to load file: {}\n", e);
        }
    }
}

fn handle_load_config() {
    let path = read_path("Configuration file", DEFAULT_CONFIG_PATH);
    match config::load_config(&path).and_then(|cfg| cfg.capacity_model().map(|m| (cfg, m))) {
        Ok((cfg, model)) => {
            println!(
                "Configuration loaded: {} capacity entries, {} ranges.\n",
                model.entries().count(),
                cfg.rangos.len()
            );
            state().config = Some(cfg);
        }
        Err(e) => eprintln!("Failed to load configuration: {}\n", e),
    }
}

fn resolve_inputs(
    events: &[AbsenceEvent],
    report: &LoadReport,
    cfg: Option<&CapacityConfig>,
) -> Result<Inputs, ConfigError> {
    let detected = Mode::for_columns(report.has_end_column);
    let Some(cfg) = cfg else {
        return Ok(Inputs {
            capacity: CapacityModel::with_defaults(filter::distinct_values(events, |e| &e.geography)),
            selection: Selection::all(events, report.has_function_column),
            ranges: filter::span(events).into_iter().map(Ok).collect(),
            options: AggregationOptions::new(detected),
        });
    };
    let mut ranges = cfg.ranges();
    if ranges.is_empty() {
        ranges = filter::span(events).into_iter().map(Ok).collect();
    }
    Ok(Inputs {
        capacity: cfg.capacity_model()?,
        selection: cfg.selection(events, report.has_function_column),
        ranges,
        options: cfg.aggregation_options(detected),
    })
}

fn handle_generate_reports() {
    let guard = state();
    let Some((events, report)) = guard.data.as_ref() else {
        println!("Error: No data loaded. Please load the absence file first (option 1).\n");
        return;
    };
    let inputs = match resolve_inputs(events, report, guard.config.as_ref()) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Invalid configuration: {}\n", e);
            return;
        }
    };

    let result = analysis::analyze(
        events,
        &inputs.selection,
        &inputs.ranges,
        &inputs.capacity,
        &inputs.options,
    );
    drop(guard);

    println!("Generating reports ({} mode)...\n", result.mode.label());
    let sheet = output::Sheet::for_analysis(&result);
    println!("Absenteeism by month and geography ({})\n", sheet.name());
    output::preview_metrics(&result, PREVIEW_ROWS);

    for r in &result.per_range {
        println!(
            "{}: {}% ({} absence hours of {} theoretical)",
            r.range,
            util::format_number(r.absenteeism_percent, 2),
            util::format_number(r.absence_hours, 2),
            util::format_number(r.theoretical_hours, 2)
        );
    }
    println!(
        "Overall absenteeism: {}%\n",
        util::format_number(result.overall, 2)
    );
    for d in &result.diagnostics {
        println!("Warning: {}", d);
    }

    match output::export_analysis(Path::new("."), &result) {
        Ok(path) => println!("(Full table exported to {})\n", path.display()),
        Err(e) => eprintln!("Write error: {}\n", e),
    }
}

fn handle_export_config() {
    let guard = state();
    let Some((events, report)) = guard.data.as_ref() else {
        println!("Error: No data loaded. Please load the absence file first (option 1).\n");
        return;
    };
    let inputs = match resolve_inputs(events, report, guard.config.as_ref()) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Invalid configuration: {}\n", e);
            return;
        }
    };
    drop(guard);

    let ranges: Vec<DateRange> = inputs.ranges.into_iter().filter_map(Result::ok).collect();
    let snapshot = CapacityConfig::from_session(&inputs.capacity, &inputs.selection, &ranges, &inputs.options);
    let path = read_path("Export configuration to", DEFAULT_CONFIG_PATH);
    match config::save_config(&path, &snapshot) {
        Ok(()) => println!("Configuration saved to {}\n", path),
        Err(e) => eprintln!("Write error: {}\n", e),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    loop {
        println!("Absenteeism Dashboard:");
        println!("[1] Load absence file");
        println!("[2] Load configuration");
        println!("[3] Generate reports");
        println!("[4] Export configuration");
        println!("[5] Exit\n");
        match read_choice().as_str() {
            "1" => handle_load(),
            "2" => handle_load_config(),
            "3" => {
                println!();
                handle_generate_reports();
            }
            "4" => handle_export_config(),
            "5" => {
                println!("Exiting the program.");
                break;
            }
            _ => {
                println!("Invalid choice. Please enter 1 to 5.\n");
            }
        }
    }
}
