use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// One unit of work: which template to run, for which date and target table.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct JobDescriptor {
    pub sql_ref: String,
    pub job_date: String,
    pub table_id: String,
    /// Group identifier of the table row the job came from, kept for log context only.
    pub group: Option<String>,
}

impl JobDescriptor {
    pub fn new_with_params(sql_ref: String, job_date: String, table_id: String) -> Self {
        Self {
            sql_ref,
            job_date,
            table_id,
            group: None,
        }
    }

    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.group = group;
        self
    }
}

/// Field names used to read a job out of a table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFields {
    pub program: String,
    pub job_date: String,
    pub table_id: String,
    pub group: String,
    pub enabled: String,
}

impl Default for RecordFields {
    fn default() -> Self {
        Self {
            program: "vs_pgm_id".to_string(),
            job_date: "vs_job_dt".to_string(),
            table_id: "vs_tbl_id".to_string(),
            group: "mid".to_string(),
            enabled: "use_yn".to_string(),
        }
    }
}

/// A single table row, field name to value.
#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobRecord {
    fields: BTreeMap<String, String>,
}

impl JobRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Absent flag means enabled; otherwise the value must be `Y`, ignoring case.
    pub fn is_enabled(&self, enabled_field: &str) -> bool {
        match self.get(enabled_field) {
            None => true,
            Some(flag) => flag.trim().eq_ignore_ascii_case("Y"),
        }
    }

    /// Union of this record and `overrides`; override values win, base-only fields stay.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, String>) -> Self {
        let mut fields = self.fields.clone();
        for (key, value) in overrides {
            fields.insert(key.clone(), value.clone());
        }
        Self { fields }
    }

    pub fn to_descriptor(&self, names: &RecordFields) -> Result<JobDescriptor, JobError> {
        let value = |field: &str| self.get(field).unwrap_or_default().trim().to_string();

        let sql_ref = value(&names.program);
        if sql_ref.is_empty() {
            return Err(JobError::MissingField {
                field: names.program.clone(),
                record: format!("{:?}", self.fields),
            });
        }

        let group = self
            .get(&names.group)
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string);

        Ok(
            JobDescriptor::new_with_params(sql_ref, value(&names.job_date), value(&names.table_id))
                .with_group(group),
        )
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for JobRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_precedence() {
        let base: JobRecord = [("vs_pgm_id", "a"), ("vs_job_dt", "20240101")]
            .into_iter()
            .collect();
        let overrides = BTreeMap::from([("vs_job_dt".to_string(), "20240102".to_string())]);

        let effective = base.with_overrides(&overrides);
        assert_eq!(effective.get("vs_job_dt"), Some("20240102"));
        assert_eq!(effective.get("vs_pgm_id"), Some("a"));
        assert_eq!(base.get("vs_job_dt"), Some("20240101"));
    }

    #[test]
    fn test_enabled_flag() {
        let fields = RecordFields::default();
        let absent: JobRecord = [("vs_pgm_id", "a")].into_iter().collect();
        let lower: JobRecord = [("use_yn", " y ")].into_iter().collect();
        let off: JobRecord = [("use_yn", "N")].into_iter().collect();
        let empty: JobRecord = [("use_yn", "")].into_iter().collect();

        assert!(absent.is_enabled(&fields.enabled));
        assert!(lower.is_enabled(&fields.enabled));
        assert!(!off.is_enabled(&fields.enabled));
        assert!(!empty.is_enabled(&fields.enabled));
    }

    #[test]
    fn test_to_descriptor() {
        let record: JobRecord = [
            ("mid", "qa"),
            ("vs_pgm_id", " sales_01.sql "),
            ("vs_job_dt", "20251223"),
        ]
        .into_iter()
        .collect();

        let job = record
            .to_descriptor(&RecordFields::default())
            .expect("record should convert");
        assert_eq!(job.sql_ref, "sales_01.sql");
        assert_eq!(job.job_date, "20251223");
        assert_eq!(job.table_id, "");
        assert_eq!(job.group.as_deref(), Some("qa"));
    }

    #[test]
    fn test_to_descriptor_missing_program() {
        let record: JobRecord = [("vs_pgm_id", "  "), ("vs_job_dt", "20251223")]
            .into_iter()
            .collect();

        let err = record
            .to_descriptor(&RecordFields::default())
            .expect_err("blank program id should fail");
        assert!(matches!(err, JobError::MissingField { ref field, .. } if field == "vs_pgm_id"));
        assert!(!err.dispatched());
    }
}
