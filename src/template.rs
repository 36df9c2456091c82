use std::fs;
use std::path::{Path, PathBuf};

use crate::error::JobError;

pub const DEFAULT_TEMPLATE_SUFFIX: &str = ".sql";

/// A template file found on disk, with its text loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTemplate {
    pub path: PathBuf,
    /// File stem, used as the program-identifier value.
    pub program_id: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct TemplateResolver {
    sql_dir: PathBuf,
    suffix: String,
}

impl TemplateResolver {
    pub fn new_with_params(sql_dir: PathBuf, suffix: Option<&str>) -> Self {
        Self {
            sql_dir,
            suffix: suffix.unwrap_or(DEFAULT_TEMPLATE_SUFFIX).to_string(),
        }
    }

    /// Absolute paths are used as-is, then paths that exist relative to the
    /// working directory, then `<sql_dir>/<sql_ref>[suffix]`.
    pub fn resolve_path(&self, sql_ref: &str) -> PathBuf {
        let candidate = Path::new(sql_ref);
        if candidate.is_absolute() {
            return candidate.to_path_buf();
        }
        if candidate.is_file() {
            return candidate.to_path_buf();
        }

        if self.has_suffix(sql_ref) {
            self.sql_dir.join(candidate)
        } else {
            self.sql_dir.join(format!("{}{}", sql_ref, self.suffix))
        }
    }

    pub fn load(&self, sql_ref: &str) -> Result<ResolvedTemplate, JobError> {
        let path = self.resolve_path(sql_ref);
        if !path.is_file() {
            return Err(JobError::TemplateNotFound(path));
        }

        let bytes = fs::read(&path).map_err(|e| JobError::TemplateUnreadable {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let program_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| sql_ref.to_string());

        Ok(ResolvedTemplate {
            text: String::from_utf8_lossy(&bytes).into_owned(),
            path,
            program_id,
        })
    }

    fn has_suffix(&self, sql_ref: &str) -> bool {
        sql_ref
            .to_ascii_lowercase()
            .ends_with(&self.suffix.to_ascii_lowercase())
    }
}
