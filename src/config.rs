use std::path::{Path, PathBuf};

use crate::error::RunnerError;
use crate::error::RunnerError::{ConfigFileNotReadable, ConfigParse};
use crate::job::RecordFields;
use crate::substitution::SubstitutionMode;
use crate::template::DEFAULT_TEMPLATE_SUFFIX;

pub const DEFAULT_LIST_SUFFIX: &str = ".list";

/// How to invoke the external query engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub program: String,
    pub args: Vec<String>,
    pub parameter_flag: String,
    pub parameter_type: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "bq".to_string(),
            args: vec![
                "query".to_string(),
                "--quiet".to_string(),
                "--use_legacy_sql=false".to_string(),
            ],
            parameter_flag: "--parameter".to_string(),
            parameter_type: "STRING".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub base_dir: PathBuf,
    pub sql_dir: PathBuf,
    pub template_suffix: String,
    pub list_suffix: String,
    pub table_csv: PathBuf,
    pub baseline_json: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub fields: RecordFields,
    pub mode: SubstitutionMode,
    pub engine: EngineConfig,
}

impl RunnerConfig {
    /// Defaults laid out under `base_dir`. File logging stays off until a log dir is set.
    pub fn new_with_params(base_dir: PathBuf) -> Self {
        Self {
            sql_dir: base_dir.join("sql"),
            template_suffix: DEFAULT_TEMPLATE_SUFFIX.to_string(),
            list_suffix: DEFAULT_LIST_SUFFIX.to_string(),
            table_csv: base_dir.join("src").join("list").join("bq.csv"),
            baseline_json: base_dir.join("src").join("list").join("bq.json"),
            log_dir: None,
            fields: RecordFields::default(),
            mode: SubstitutionMode::default(),
            engine: EngineConfig::default(),
            base_dir,
        }
    }

    pub fn parse_from_file(file_path: &Path, base_dir: PathBuf) -> Result<Self, RunnerError> {
        let config_str = std::fs::read_to_string(file_path).map_err(|e| {
            ConfigFileNotReadable(file_path.display().to_string(), e.to_string())
        })?;
        Self::parse_str(config_str.as_str(), base_dir)
    }

    /// Reads a YAML mapping on top of the defaults. Relative paths are taken
    /// against `base_dir` (or the file's own `base_dir` key when present).
    pub fn parse_str(config_str: &str, base_dir: PathBuf) -> Result<Self, RunnerError> {
        let config_yaml = serde_yml::from_str::<serde_yml::Value>(config_str)
            .map_err(|e| ConfigParse(e.to_string()))?;
        if config_yaml.is_null() {
            return Ok(Self::new_with_params(base_dir));
        }
        let serde_yml::Value::Mapping(entries) = config_yaml else {
            return Err(ConfigParse("Expected a mapping of settings".to_string()));
        };

        let base_dir = match entries.get("base_dir") {
            Some(value) => base_dir.join(expect_str("base_dir", value)?),
            None => base_dir,
        };
        let mut config = Self::new_with_params(base_dir);

        for (key, value) in entries.iter() {
            let serde_yml::Value::String(key) = key else {
                return Err(ConfigParse("setting names should be strings".to_string()));
            };

            match key.as_str() {
                "base_dir" => {}
                "sql_dir" => config.sql_dir = config.path(expect_str(key, value)?),
                "template_suffix" => config.template_suffix = expect_str(key, value)?.to_string(),
                "list_suffix" => config.list_suffix = expect_str(key, value)?.to_string(),
                "table_csv" => config.table_csv = config.path(expect_str(key, value)?),
                "baseline_json" => config.baseline_json = config.path(expect_str(key, value)?),
                "log_dir" => config.log_dir = Some(config.path(expect_str(key, value)?)),
                "mode" => {
                    config.mode = expect_str(key, value)?.parse().map_err(ConfigParse)?;
                }
                "fields" => config.fields = parse_fields(value, config.fields)?,
                "engine" => config.engine = parse_engine(value, config.engine)?,
                other => return Err(ConfigParse(format!("unknown setting `{}`", other))),
            }
        }

        Ok(config)
    }

    fn path(&self, value: &str) -> PathBuf {
        self.base_dir.join(value)
    }
}

fn expect_str<'a>(key: &str, value: &'a serde_yml::Value) -> Result<&'a str, RunnerError> {
    let serde_yml::Value::String(value) = value else {
        return Err(ConfigParse(format!("{} should be a string", key)));
    };
    Ok(value.as_str())
}

fn parse_fields(value: &serde_yml::Value, mut fields: RecordFields) -> Result<RecordFields, RunnerError> {
    let serde_yml::Value::Mapping(entries) = value else {
        return Err(ConfigParse("fields should be a map".to_string()));
    };

    for (key, value) in entries.iter() {
        let key = expect_str("field name", key)?;
        let name = expect_str(key, value)?.to_string();
        match key {
            "program" => fields.program = name,
            "job_date" => fields.job_date = name,
            "table_id" => fields.table_id = name,
            "group" => fields.group = name,
            "enabled" => fields.enabled = name,
            other => return Err(ConfigParse(format!("unknown field role `{}`", other))),
        }
    }
    Ok(fields)
}

fn parse_engine(value: &serde_yml::Value, mut engine: EngineConfig) -> Result<EngineConfig, RunnerError> {
    let serde_yml::Value::Mapping(entries) = value else {
        return Err(ConfigParse("engine should be a map".to_string()));
    };

    for (key, value) in entries.iter() {
        let key = expect_str("engine setting", key)?;
        match key {
            "program" => engine.program = expect_str(key, value)?.to_string(),
            "parameter_flag" => engine.parameter_flag = expect_str(key, value)?.to_string(),
            "parameter_type" => engine.parameter_type = expect_str(key, value)?.to_string(),
            "args" => {
                let serde_yml::Value::Sequence(items) = value else {
                    return Err(ConfigParse("engine.args should be a list".to_string()));
                };
                engine.args = items
                    .iter()
                    .map(|item| expect_str("engine.args item", item).map(str::to_string))
                    .collect::<Result<_, _>>()?;
            }
            other => return Err(ConfigParse(format!("unknown engine setting `{}`", other))),
        }
    }
    Ok(engine)
}
