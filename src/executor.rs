use std::io::{self, BufRead, BufReader};

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, JobError, RunnerError};
use crate::substitution::SubstitutionResult;

/// Something that can run one rendered query to completion.
pub trait QueryEngine {
    fn execute(&self, label: &str, query: &SubstitutionResult) -> Result<(), EngineError>;
}

/// Runs queries through an external command, feeding the query text on stdin.
pub struct Executor {
    engine: EngineConfig,
}

impl Executor {
    pub fn new_with_params(engine: EngineConfig) -> Self {
        Self { engine }
    }

    /// Program, fixed arguments, then one parameter flag per binding.
    pub fn command(&self, query: &SubstitutionResult) -> Vec<String> {
        let mut cmd = vec![self.engine.program.clone()];
        cmd.extend(self.engine.args.iter().cloned());
        cmd.extend(query.bindings.iter().map(|b| {
            format!(
                "{}={}",
                self.engine.parameter_flag,
                b.declaration(&self.engine.parameter_type)
            )
        }));
        cmd
    }
}

impl QueryEngine for Executor {
    fn execute(&self, label: &str, query: &SubstitutionResult) -> Result<(), EngineError> {
        let cmd = self.command(query);

        let mut process = subprocess::Popen::create(
            cmd.as_slice(),
            subprocess::PopenConfig {
                stdin: subprocess::Redirection::Pipe,
                stdout: subprocess::Redirection::Pipe,
                stderr: subprocess::Redirection::Merge,
                ..Default::default()
            },
        )
        .map_err(|e| RunnerError::EngineUnavailable {
            program: self.engine.program.clone(),
            reason: e.to_string(),
        })?;

        // An engine that exits without reading all of stdin still has a status to report.
        let output = match process.communicate_bytes(Some(query.text.as_bytes())) {
            Ok((output, _)) => output,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                warn!("[{}] engine closed its input before reading the whole query", label);
                None
            }
            Err(e) => return Err(JobError::EngineIo(e.to_string()).into()),
        };

        if let Some(output) = output {
            for line in BufReader::new(output.as_slice()).lines() {
                match line {
                    Ok(line) => info!("[{}] | {}", label, line),
                    Err(_) => warn!("[{}] | <unreadable engine output>", label),
                }
            }
        }

        let status = process
            .wait()
            .map_err(|e| JobError::EngineIo(e.to_string()))?;

        match status {
            subprocess::ExitStatus::Exited(0) => Ok(()),
            subprocess::ExitStatus::Exited(code) => {
                debug!("[{}] exit_code={}", label, code);
                Err(JobError::QueryFailed { code }.into())
            }
            subprocess::ExitStatus::Signaled(signal) => {
                debug!("[{}] signal={}", label, signal);
                Err(JobError::QueryKilled { signal }.into())
            }
            other => Err(JobError::EngineIo(format!("unknown exit status {:?}", other)).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substitution::{render, SubstitutionMode, Variables};

    fn sh(script: &str) -> Executor {
        Executor::new_with_params(EngineConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
            ..EngineConfig::default()
        })
    }

    fn query(template: &str, mode: SubstitutionMode) -> SubstitutionResult {
        let vars = Variables {
            program_id: "sales_01".to_string(),
            job_date: "20240101".to_string(),
            table_id: "DW.SALES".to_string(),
        };
        render(template, mode, &vars)
    }

    #[test]
    fn test_command_with_bindings() {
        let executor = Executor::new_with_params(EngineConfig::default());
        let cmd = executor.command(&query("SELECT {vs_job_dt}", SubstitutionMode::Parameterized));
        assert_eq!(
            cmd,
            vec![
                "bq",
                "query",
                "--quiet",
                "--use_legacy_sql=false",
                "--parameter=vs_job_dt:STRING:20240101",
            ]
        );
    }

    #[test]
    fn test_command_literal_has_no_bindings() {
        let executor = Executor::new_with_params(EngineConfig::default());
        let cmd = executor.command(&query("SELECT {vs_job_dt}", SubstitutionMode::Literal));
        assert_eq!(cmd.len(), 4);
    }

    #[test]
    fn test_query_text_goes_to_stdin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("stdin.sql");
        let executor = sh(&format!("cat > '{}'", out.display()));

        executor
            .execute("stdin", &query("SELECT {vs_tbl_id}", SubstitutionMode::Literal))
            .expect("cat should succeed");
        assert_eq!(
            std::fs::read_to_string(&out).expect("output written"),
            "SELECT 'DW.SALES'"
        );
    }

    #[test]
    fn test_bindings_are_arguments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("args.txt");
        let executor = sh(&format!("printf '%s\\n' \"$@\" > '{}'", out.display()));

        executor
            .execute(
                "args",
                &query("SELECT {vs_job_dt}, {vs_tbl_id}", SubstitutionMode::Parameterized),
            )
            .expect("printf should succeed");
        assert_eq!(
            std::fs::read_to_string(&out).expect("output written"),
            "--parameter=vs_job_dt:STRING:20240101\n--parameter=vs_tbl_id:STRING:DW.SALES\n"
        );
    }

    #[test]
    fn test_non_zero_exit_is_query_failure() {
        let executor = sh("cat > /dev/null; echo boom; exit 3");
        let err = executor
            .execute("fails", &query("SELECT 1", SubstitutionMode::Literal))
            .expect_err("exit 3 should fail");
        assert_eq!(err, EngineError::Query(JobError::QueryFailed { code: 3 }));
    }

    #[test]
    fn test_early_exit_keeps_exit_code() {
        let executor = sh("exit 3");
        let big = SubstitutionResult {
            text: "SELECT 1;\n".repeat(128 * 1024),
            bindings: Vec::new(),
            unresolved: Vec::new(),
        };
        assert!(big.text.len() >= 1024 * 1024);

        let err = executor
            .execute("early-exit", &big)
            .expect_err("exit 3 should fail");
        assert_eq!(err, EngineError::Query(JobError::QueryFailed { code: 3 }));
    }

    #[test]
    fn test_missing_program_is_environment_error() {
        let executor = Executor::new_with_params(EngineConfig {
            program: "definitely-not-a-query-engine-7f3a".to_string(),
            ..EngineConfig::default()
        });
        let err = executor
            .execute("missing", &query("SELECT 1", SubstitutionMode::Literal))
            .expect_err("program does not exist");
        assert!(matches!(
            err,
            EngineError::Unavailable(RunnerError::EngineUnavailable { .. })
        ));
    }
}
