//! gridmodel - Run a spreadsheet model with parameter overrides and print
//! its output tables.

mod config;

use anyhow::{Context, Result};
use gridmodel_core::storage::md::{render_markdown, render_parameters};
use gridmodel_core::{
    LabelOverrides, ModelRunner, ParameterMap, ParameterTree, load_parameter_defaults, load_workbook,
    parameters_from_toml, scenario_headers,
};
use std::env;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn print_usage() {
    eprintln!("Usage: gridmodel [OPTIONS] [FILE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [FILE]                    Workbook to run (.xlsx, .xlsm, .xls, .xlsb, .ods, .grd)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --sheet <NAME>        Sheet to run (default: first sheet)");
    eprintln!("  -p, --params <FILE>       Parameter values from a TOML file");
    eprintln!("  -c, --config <FILE>       Layout config (default: <config dir>/gridmodel/config.toml)");
    eprintln!("  -l, --label <COL=TEXT>    Override a scenario column header (can be repeated)");
    eprintln!("  --json                    Print JSON instead of markdown");
    eprintln!("  --list-params             Print the parameter defaults and exit");
    eprintln!("  --headers                 Print the scenario column headers and exit");
    eprintln!("  -h, --help                Print help");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Run,
    ListParams,
    Headers,
}

#[derive(Debug)]
struct Options {
    file_path: Option<PathBuf>,
    sheet: Option<String>,
    params_file: Option<PathBuf>,
    config_file: Option<PathBuf>,
    labels: Vec<(String, String)>,
    json: bool,
    mode: Mode,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut opts = Options {
        file_path: None,
        sheet: None,
        params_file: None,
        config_file: None,
        labels: Vec::new(),
        json: false,
        mode: Mode::Run,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                return;
            }
            "-s" | "--sheet" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --sheet requires a sheet name");
                    std::process::exit(1);
                }
                opts.sheet = Some(args[i].to_string());
            }
            "-p" | "--params" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --params requires a file path");
                    std::process::exit(1);
                }
                opts.params_file = Some(PathBuf::from(&args[i]));
            }
            "-c" | "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a file path");
                    std::process::exit(1);
                }
                opts.config_file = Some(PathBuf::from(&args[i]));
            }
            "-l" | "--label" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --label requires COL=TEXT");
                    std::process::exit(1);
                }
                match config::parse_label(&args[i]) {
                    Some(label) => opts.labels.push(label),
                    None => {
                        eprintln!("Error: Invalid label override: {} (expected COL=TEXT)", args[i]);
                        std::process::exit(1);
                    }
                }
            }
            "--json" => opts.json = true,
            "--list-params" => opts.mode = Mode::ListParams,
            "--headers" => opts.mode = Mode::Headers,
            arg if arg.starts_with('-') => {
                eprintln!("Error: Unknown option: {}", arg);
                print_usage();
                std::process::exit(1);
            }
            _ => {
                if opts.file_path.is_none() {
                    opts.file_path = Some(PathBuf::from(&args[i]));
                } else {
                    eprintln!("Error: Unexpected argument: {}", args[i]);
                    print_usage();
                    std::process::exit(1);
                }
            }
        }
        i += 1;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    match run(opts) {
        Ok(out) => print!("{}", out),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(opts: Options) -> Result<String> {
    let config = config::load_config(opts.config_file.as_deref())?;

    let mut overrides: LabelOverrides = config.labels;
    overrides.extend(opts.labels);

    debug!(labels = overrides.len(), "label overrides");

    let runner = ModelRunner::new(config.layout);

    match opts.mode {
        Mode::Run => {
            let params = match &opts.params_file {
                Some(path) => {
                    let content = config::read_params_file(path)?;
                    parameters_from_toml(&content)
                        .with_context(|| format!("Failed to parse {}", path.display()))?
                }
                None => ParameterMap::new(),
            };
            info!(
                file = ?opts.file_path,
                sheet = ?opts.sheet,
                params = params.len(),
                "running model"
            );

            let output = match &opts.file_path {
                Some(path) => runner
                    .run_file(path, opts.sheet.as_deref(), &params, &overrides)
                    .with_context(|| format!("Failed to run {}", path.display()))?,
                None => runner.run(None, "", &params, &overrides)?,
            };

            if opts.json {
                Ok(serde_json::to_string_pretty(&output)? + "\n")
            } else {
                Ok(render_markdown(&output))
            }
        }
        Mode::ListParams | Mode::Headers => {
            let path = opts
                .file_path
                .as_ref()
                .context("A workbook file is required")?;
            let workbook = load_workbook(path).with_context(|| format!("Failed to open {}", path.display()))?;
            let sheet = workbook.sheet(opts.sheet.as_deref())?;

            if opts.mode == Mode::Headers {
                let mut headers = scenario_headers(sheet, runner.layout());
                headers.extend(overrides);
                return if opts.json {
                    Ok(serde_json::to_string_pretty(&headers)? + "\n")
                } else {
                    Ok(headers
                        .iter()
                        .map(|(col, text)| format!("{}: {}\n", col, text))
                        .collect())
                };
            }

            let rows = load_parameter_defaults(sheet, runner.layout());
            if opts.json {
                Ok(serde_json::to_string_pretty(&ParameterTree::reconstruct(&rows))? + "\n")
            } else {
                Ok(render_parameters(&rows))
            }
        }
    }
}
