//! Placeholder substitution for query templates.
//!
//! Templates may reference three variables, written `{vs_pgm_id}`,
//! `{vs_job_dt}` and `{vs_tbl_id}`. Literal mode inlines them as quoted
//! string constants; parameterized mode rewrites them to `@name` references
//! and returns bindings for the ones the rendered text actually uses.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Placeholder {
    ProgramId,
    JobDate,
    TableId,
}

impl Placeholder {
    pub const ALL: [Placeholder; 3] = [
        Placeholder::ProgramId,
        Placeholder::JobDate,
        Placeholder::TableId,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Placeholder::ProgramId => "vs_pgm_id",
            Placeholder::JobDate => "vs_job_dt",
            Placeholder::TableId => "vs_tbl_id",
        }
    }

    /// Raw template token, e.g. `{vs_job_dt}`.
    pub fn token(self) -> String {
        format!("{{{}}}", self.name())
    }

    /// Named-parameter reference, e.g. `@vs_job_dt`.
    pub fn reference(self) -> String {
        format!("@{}", self.name())
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubstitutionMode {
    #[default]
    Literal,
    Parameterized,
}

impl FromStr for SubstitutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "literal" => Ok(SubstitutionMode::Literal),
            "param" | "parameterized" => Ok(SubstitutionMode::Parameterized),
            other => Err(format!(
                "unknown substitution mode `{}` (expected literal or parameterized)",
                other
            )),
        }
    }
}

/// Values for the three placeholders of one job.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Variables {
    pub program_id: String,
    pub job_date: String,
    pub table_id: String,
}

impl Variables {
    pub fn value(&self, placeholder: Placeholder) -> &str {
        match placeholder {
            Placeholder::ProgramId => &self.program_id,
            Placeholder::JobDate => &self.job_date,
            Placeholder::TableId => &self.table_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterBinding {
    pub placeholder: Placeholder,
    pub value: String,
}

impl ParameterBinding {
    /// `name:TYPE:value`, the form the engine's parameter flag takes.
    pub fn declaration(&self, type_name: &str) -> String {
        format!("{}:{}:{}", self.placeholder.name(), type_name, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionResult {
    pub text: String,
    /// Always empty in literal mode.
    pub bindings: Vec<ParameterBinding>,
    /// Raw tokens still present after rendering. Reported, never fatal.
    pub unresolved: Vec<Placeholder>,
}

/// Wraps `value` in single quotes, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn render(template: &str, mode: SubstitutionMode, vars: &Variables) -> SubstitutionResult {
    let mut text = template.to_string();
    for placeholder in Placeholder::ALL {
        let replacement = match mode {
            SubstitutionMode::Literal => quote_literal(vars.value(placeholder)),
            SubstitutionMode::Parameterized => placeholder.reference(),
        };
        text = text.replace(&placeholder.token(), &replacement);
    }

    let bindings = match mode {
        SubstitutionMode::Literal => Vec::new(),
        SubstitutionMode::Parameterized => Placeholder::ALL
            .into_iter()
            .filter(|p| references(&text, *p))
            .map(|p| ParameterBinding {
                placeholder: p,
                value: vars.value(p).to_string(),
            })
            .collect(),
    };

    let unresolved = unresolved_placeholders(&text);
    SubstitutionResult {
        text,
        bindings,
        unresolved,
    }
}

pub fn unresolved_placeholders(text: &str) -> Vec<Placeholder> {
    Placeholder::ALL
        .into_iter()
        .filter(|p| text.contains(&p.token()))
        .collect()
}

/// Whether `text` contains `@name` not followed by another identifier character.
pub fn references(text: &str, placeholder: Placeholder) -> bool {
    let needle = placeholder.reference();
    text.match_indices(&needle).any(|(idx, _)| {
        text[idx + needle.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
    })
}

/// Whether the template mentions `placeholder` in either written form.
pub fn mentions(text: &str, placeholder: Placeholder) -> bool {
    text.contains(&placeholder.token()) || references(text, placeholder)
}
