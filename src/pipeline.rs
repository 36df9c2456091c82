use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::baseline;
use crate::config::RunnerConfig;
use crate::error::{EngineError, JobError, RunnerError};
use crate::error::RunnerError::Usage;
use crate::executor::QueryEngine;
use crate::job::JobDescriptor;
use crate::source::{self, TableFilter};
use crate::substitution::{self, Placeholder, SubstitutionMode, Variables};
use crate::template::TemplateResolver;

/// Counters for one batch. `total` counts jobs handed to the engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchTally {
    pub total: usize,
    pub success: usize,
    pub fail: usize,
}

impl BatchTally {
    pub fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Succeeded => {
                self.total += 1;
                self.success += 1;
            }
            JobOutcome::Failed(err) => {
                if err.dispatched() {
                    self.total += 1;
                }
                self.fail += 1;
            }
        }
    }

    pub fn exit_code(&self) -> u8 {
        if self.fail == 0 {
            0
        } else {
            1
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(JobError),
}

/// Runs jobs one after another; a failed job never stops the ones after it.
pub struct BatchRunner<'a, E: QueryEngine> {
    resolver: &'a TemplateResolver,
    mode: SubstitutionMode,
    engine: &'a E,
}

impl<'a, E: QueryEngine> BatchRunner<'a, E> {
    pub fn new_with_params(resolver: &'a TemplateResolver, mode: SubstitutionMode, engine: &'a E) -> Self {
        Self {
            resolver,
            mode,
            engine,
        }
    }

    /// Only an unreachable engine ends the batch early.
    pub fn run<I>(&self, jobs: I) -> Result<BatchTally, RunnerError>
    where
        I: IntoIterator<Item = Result<JobDescriptor, JobError>>,
    {
        let mut tally = BatchTally::default();

        for job in jobs {
            let outcome = match job {
                Ok(job) => self.run_job(&job)?,
                Err(err) => {
                    error!("{}", err);
                    JobOutcome::Failed(err)
                }
            };
            tally.record(&outcome);
        }

        info!(
            "SUMMARY total={}, success={}, fail={}",
            tally.total, tally.success, tally.fail
        );
        Ok(tally)
    }

    pub fn run_job(&self, job: &JobDescriptor) -> Result<JobOutcome, RunnerError> {
        let template = match self.resolver.load(&job.sql_ref) {
            Ok(template) => template,
            Err(err) => {
                error!(
                    sql_ref = %job.sql_ref,
                    job_date = %job.job_date,
                    table_id = %job.table_id,
                    "{}",
                    err
                );
                return Ok(JobOutcome::Failed(err));
            }
        };

        debug!(path = %template.path.display(), "resolved template");

        let vars = Variables {
            program_id: template.program_id.clone(),
            job_date: job.job_date.clone(),
            table_id: job.table_id.clone(),
        };
        let query = substitution::render(&template.text, self.mode, &vars);
        if !query.unresolved.is_empty() {
            let names: Vec<&str> = query.unresolved.iter().map(|p| p.name()).collect();
            warn!(
                sql_ref = %job.sql_ref,
                placeholders = ?names,
                "SQL still contains template placeholders after substitution; leaving them unchanged"
            );
        }

        info!(
            "{} (mid={}, job_dt={}, tbl_id={})",
            job.sql_ref,
            job.group.as_deref().unwrap_or(""),
            job.job_date,
            job.table_id
        );

        match self.engine.execute(&job.sql_ref, &query) {
            Ok(()) => Ok(JobOutcome::Succeeded),
            Err(EngineError::Query(err)) => {
                error!(
                    sql_ref = %job.sql_ref,
                    job_date = %job.job_date,
                    table_id = %job.table_id,
                    "{}",
                    err
                );
                Ok(JobOutcome::Failed(err))
            }
            Err(EngineError::Unavailable(err)) => Err(err),
        }
    }
}

/// Entry points for the three ways a run can be started.
pub struct Pipeline<'a, E: QueryEngine> {
    config: &'a RunnerConfig,
    resolver: TemplateResolver,
    engine: &'a E,
}

impl<'a, E: QueryEngine> Pipeline<'a, E> {
    pub fn new_with_params(config: &'a RunnerConfig, engine: &'a E) -> Self {
        let resolver =
            TemplateResolver::new_with_params(config.sql_dir.clone(), Some(&config.template_suffix));
        Self {
            config,
            resolver,
            engine,
        }
    }

    fn runner(&self) -> BatchRunner<'_, E> {
        BatchRunner::new_with_params(&self.resolver, self.config.mode, self.engine)
    }

    /// `run <path> [job_date table_id]`, dispatched on the path's extension.
    pub fn run_path(&self, path: &str, positional: &[String]) -> Result<BatchTally, RunnerError> {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(&self.config.list_suffix.to_ascii_lowercase()) {
            if !positional.is_empty() {
                return Err(Usage(format!("Usage: run <jobs{}>", self.config.list_suffix)));
            }
            return self.run_list(Path::new(path));
        }

        if lower.ends_with(&self.config.template_suffix.to_ascii_lowercase()) {
            return match positional {
                [] => self.run_single(path, None),
                [job_date, table_id] => self.run_single(path, Some((job_date, table_id))),
                _ => Err(Usage(format!(
                    "Usage: run <query{}> [job_date table_id]",
                    self.config.template_suffix
                ))),
            };
        }

        Err(Usage(format!(
            "Unsupported input file type: {} (expected {} or {})",
            path, self.config.list_suffix, self.config.template_suffix
        )))
    }

    pub fn run_list(&self, list_file: &Path) -> Result<BatchTally, RunnerError> {
        let jobs = source::read_list_file(list_file)?;
        info!(list = %list_file.display(), entries = jobs.len(), "running list");
        self.runner().run(jobs)
    }

    /// One template, with job date and table id from the command line.
    pub fn run_single(
        &self,
        sql_ref: &str,
        values: Option<(&String, &String)>,
    ) -> Result<BatchTally, RunnerError> {
        let (job_date, table_id) = values
            .map(|(d, t)| (d.trim().to_string(), t.trim().to_string()))
            .unwrap_or_default();

        if let Ok(template) = self.resolver.load(sql_ref) {
            let missing = [
                (Placeholder::JobDate, &job_date),
                (Placeholder::TableId, &table_id),
            ]
            .into_iter()
            .any(|(p, value)| value.is_empty() && substitution::mentions(&template.text, p));
            if missing {
                return Err(Usage(format!(
                    "{} references job_dt/tbl_id placeholders. Usage: run {} <job_dt> <tbl_id>",
                    sql_ref, sql_ref
                )));
            }
        }

        let job = JobDescriptor::new_with_params(sql_ref.to_string(), job_date, table_id);
        self.runner().run([Ok(job)])
    }

    /// Table-driven run: `key=value` arguments become filters and overrides.
    pub fn run_table(&self, args: &[String]) -> Result<BatchTally, RunnerError> {
        let mut overrides = parse_kv_args(args)?;
        let fields = &self.config.fields;
        let filter = TableFilter {
            group: overrides.remove(&fields.group).filter(|v| !v.is_empty()),
            program: overrides.remove(&fields.program).filter(|v| !v.is_empty()),
        };

        let records = baseline::refresh_baseline(&self.config.table_csv, &self.config.baseline_json)?;
        info!(baseline = %self.config.baseline_json.display(), "generated JSON baseline");

        let jobs = source::table_jobs(&records, &filter, &overrides, fields)?;
        self.runner().run(jobs)
    }
}

pub fn parse_kv_args(args: &[String]) -> Result<BTreeMap<String, String>, RunnerError> {
    args.iter()
        .map(|token| {
            let Some((key, value)) = token.split_once('=') else {
                return Err(Usage(format!("Invalid arg (expected key=value): {}", token)));
            };
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}
