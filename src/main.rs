mod baseline;
mod config;
mod error;
mod executor;
mod job;
mod logging;
mod pipeline;
mod source;
mod substitution;
mod template;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::executor::Executor;
use crate::logging::LogConfig;
use crate::pipeline::Pipeline;
use crate::substitution::SubstitutionMode;

const APP_NAME: &str = "query-batch-runner";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// YAML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root for the default sql/, src/list/ and log/ locations
    #[arg(long, env = "QUERY_RUNNER_HOME")]
    base_dir: Option<PathBuf>,

    #[arg(long)]
    sql_dir: Option<PathBuf>,

    /// literal or parameterized
    #[arg(long)]
    mode: Option<SubstitutionMode>,

    /// Write dated .log/.log.err files under this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Query engine executable
    #[arg(long)]
    engine: Option<String>,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a job list (.list) or a single template (.sql [job_dt tbl_id])
    Run { path: String, values: Vec<String> },

    /// Run jobs from the CSV table, filtered and overridden by key=value pairs
    Table { args: Vec<String> },
}

fn load_config(args: &Args) -> anyhow::Result<RunnerConfig> {
    let base_dir = match &args.base_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to determine working directory")?,
    };

    let mut config = match &args.config {
        Some(path) => RunnerConfig::parse_from_file(path, base_dir)?,
        None => RunnerConfig::new_with_params(base_dir),
    };

    if let Some(sql_dir) = &args.sql_dir {
        config.sql_dir = sql_dir.clone();
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(log_dir) = &args.log_dir {
        config.log_dir = Some(log_dir.clone());
    }
    if let Some(engine) = &args.engine {
        config.engine.program = engine.clone();
    }
    Ok(config)
}

fn run(args: Args) -> anyhow::Result<u8> {
    let config = load_config(&args);
    let log_dir = config.as_ref().ok().and_then(|c| c.log_dir.clone());

    let files = logging::init_logging(LogConfig {
        app_name: APP_NAME,
        log_dir: log_dir.as_deref(),
        verbose: args.verbose,
    })?;
    if let Some(files) = files {
        info!("SUCCESS LOG : {}", files.out.display());
        info!("ERROR LOG   : {}", files.err.display());
    }

    let config = config?;
    let executor = Executor::new_with_params(config.engine.clone());
    let pipeline = Pipeline::new_with_params(&config, &executor);

    let tally = match &args.command {
        Command::Run { path, values } => pipeline.run_path(path, values)?,
        Command::Table { args } => pipeline.run_table(args)?,
    };
    Ok(tally.exit_code())
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            if tracing::dispatcher::has_been_set() {
                error!("{:#}", err);
            } else {
                eprintln!("Execution failed Error: {:#}", err);
            }
            let code = err
                .downcast_ref::<RunnerError>()
                .map_or(1, RunnerError::exit_code);
            ExitCode::from(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_run_single_with_values() {
        let args = Args::try_parse_from([
            APP_NAME,
            "--mode",
            "parameterized",
            "run",
            "dw/sales_01.sql",
            "20240101",
            "DW.SALES",
        ])
        .expect("args should parse");

        assert_eq!(args.mode, Some(SubstitutionMode::Parameterized));
        let Command::Run { path, values } = args.command else {
            panic!("expected run command");
        };
        assert_eq!(path, "dw/sales_01.sql");
        assert_eq!(values, vec!["20240101", "DW.SALES"]);
    }

    #[test]
    fn test_args_table() {
        let args = Args::try_parse_from([APP_NAME, "table", "mid=qa", "vs_job_dt=20251201"])
            .expect("args should parse");
        let Command::Table { args } = args.command else {
            panic!("expected table command");
        };
        assert_eq!(args, vec!["mid=qa", "vs_job_dt=20251201"]);
    }

    #[test]
    fn test_load_config_cli_overrides() {
        let args = Args::try_parse_from([
            APP_NAME,
            "--base-dir",
            "/srv/hc",
            "--sql-dir",
            "/opt/sql",
            "--engine",
            "fake-bq",
            "run",
            "jobs.list",
        ])
        .expect("args should parse");

        let config = load_config(&args).expect("no config file to read");
        assert_eq!(config.sql_dir, PathBuf::from("/opt/sql"));
        assert_eq!(config.table_csv, PathBuf::from("/srv/hc/src/list/bq.csv"));
        assert_eq!(config.engine.program, "fake-bq");
    }
}
