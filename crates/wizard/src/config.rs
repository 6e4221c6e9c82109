//! Wizard configuration loaded from environment variables or TOML.

use std::env;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Names of the request parameters the wizard reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterNames {
    /// Sparse fieldsets, `fields[<group>]=a,b` (default: "fields").
    pub fields: String,
    /// Filters, `filter[<alias>]=value` (default: "filter").
    pub filter: String,
    /// Sorts, `sort=-name,id` (default: "sort").
    pub sort: String,
    /// Includes, `include=relatedModels` (default: "include").
    pub include: String,
    /// Appends, `append=fullname` (default: "append").
    pub append: String,
}

impl Default for ParameterNames {
    fn default() -> Self {
        Self {
            fields: "fields".to_string(),
            filter: "filter".to_string(),
            sort: "sort".to_string(),
            include: "include".to_string(),
            append: "append".to_string(),
        }
    }
}

/// Wizard configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    /// Suffix marking a relation-count include (default: "Count").
    pub count_suffix: String,

    /// Request parameter names.
    pub parameters: ParameterNames,

    /// Separator for list values in the request (default: ',').
    pub array_separator: char,

    /// Exclude soft-deleted records from searches over soft-deleting
    /// models unless a query opts in (default: true).
    pub soft_delete: bool,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            count_suffix: "Count".to_string(),
            parameters: ParameterNames::default(),
            array_separator: ',',
            soft_delete: true,
        }
    }
}

impl WizardConfig {
    /// Load configuration from `WIZARD_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(suffix) = lookup("WIZARD_COUNT_SUFFIX") {
            if suffix.is_empty() {
                bail!("WIZARD_COUNT_SUFFIX must not be empty");
            }
            config.count_suffix = suffix;
        }

        if let Some(separator) = lookup("WIZARD_ARRAY_SEPARATOR") {
            config.array_separator =
                single_char(&separator).context("WIZARD_ARRAY_SEPARATOR must be one character")?;
        }

        if let Some(soft_delete) = lookup("WIZARD_SOFT_DELETE") {
            config.soft_delete = soft_delete
                .parse()
                .context("WIZARD_SOFT_DELETE must be true or false")?;
        }

        let params = &mut config.parameters;
        for (key, slot) in [
            ("WIZARD_FIELDS_PARAMETER", &mut params.fields),
            ("WIZARD_FILTER_PARAMETER", &mut params.filter),
            ("WIZARD_SORT_PARAMETER", &mut params.sort),
            ("WIZARD_INCLUDE_PARAMETER", &mut params.include),
            ("WIZARD_APPEND_PARAMETER", &mut params.append),
        ] {
            if let Some(value) = lookup(key) {
                if value.trim().is_empty() {
                    tracing::warn!(key, "empty parameter name ignored, keeping default");
                    continue;
                }
                *slot = value.trim().to_string();
            }
        }

        Ok(config)
    }

    /// Parse configuration from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).context("invalid wizard configuration")?;
        if config.count_suffix.is_empty() {
            bail!("count_suffix must not be empty");
        }
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&source)
    }
}

fn single_char(value: &str) -> Option<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}
