use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{JobError, RunnerError};
use crate::job::{JobDescriptor, JobRecord, RecordFields};

/// Parses one list-file line. `Ok(None)` for blank and `#` comment lines.
pub fn parse_list_line(line_no: usize, line: &str) -> Result<Option<JobDescriptor>, JobError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    let [sql_ref, job_date, table_id, ..] = parts.as_slice() else {
        return Err(JobError::MalformedLine {
            line_no,
            line: line.to_string(),
        });
    };

    Ok(Some(JobDescriptor::new_with_params(
        sql_ref.to_string(),
        job_date.to_string(),
        table_id.to_string(),
    )))
}

/// Turns list-file text into jobs in line order. Malformed lines stay in the
/// sequence as errors so the batch can count them and carry on.
pub fn parse_list(text: &str) -> Vec<Result<JobDescriptor, JobError>> {
    text.lines()
        .enumerate()
        .filter_map(|(idx, line)| parse_list_line(idx + 1, line).transpose())
        .collect()
}

pub fn read_list_file(path: &Path) -> Result<Vec<Result<JobDescriptor, JobError>>, RunnerError> {
    if !path.exists() {
        return Err(RunnerError::SourceNotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)
        .map_err(|e| RunnerError::SourceUnreadable(path.to_path_buf(), e.to_string()))?;
    Ok(parse_list(&String::from_utf8_lossy(&bytes)))
}

/// Row selection for the table-driven variant. Rows with the enabled flag off
/// are always dropped; `group` and `program` narrow by exact match when set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableFilter {
    pub group: Option<String>,
    pub program: Option<String>,
}

impl TableFilter {
    pub fn select(&self, records: &[JobRecord], names: &RecordFields) -> Vec<JobRecord> {
        records
            .iter()
            .filter(|r| r.is_enabled(&names.enabled))
            .filter(|r| match self.group.as_deref() {
                Some(group) => r.get(&names.group) == Some(group),
                None => true,
            })
            .filter(|r| match self.program.as_deref() {
                Some(program) => r.get(&names.program) == Some(program),
                None => true,
            })
            .cloned()
            .collect()
    }
}

/// Selects rows, applies the batch override to each and converts them to jobs.
/// An empty selection is a configuration error, not a per-job failure.
pub fn table_jobs(
    records: &[JobRecord],
    filter: &TableFilter,
    overrides: &BTreeMap<String, String>,
    names: &RecordFields,
) -> Result<Vec<Result<JobDescriptor, JobError>>, RunnerError> {
    let targets = filter.select(records, names);
    if targets.is_empty() {
        return Err(RunnerError::NoMatchingJobs);
    }

    Ok(targets
        .iter()
        .map(|r| r.with_overrides(overrides).to_descriptor(names))
        .collect())
}
