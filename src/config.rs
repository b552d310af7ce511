use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("length_ratio_cutoff must be within (0, 1], got {0}")]
    LengthCutoff(f64),
    #[error("batch_size must be positive, got {0}")]
    BatchSize(usize),
    #[error("parallelism must be positive, got {0}")]
    Parallelism(usize),
    #[error("invalid delimiter pattern {pattern:?}: {source}")]
    Delimiters {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid variable rule {rule:?}: {reason}")]
    Variable { rule: String, reason: String },
    #[error("normalization = \"custom\" requires at least one variable rule")]
    NoVariables,
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Normalization {
    #[default]
    None,
    NumericPlaceholder,
    Custom,
}

/// What happens to unaligned context around the aligned core during a fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GapPolicy {
    Truncate,
    #[default]
    WildcardPad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReductionShape {
    #[default]
    Balanced,
    Sequential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    pub batch_size: usize,
    pub assign_threshold: f64,
    pub merge_threshold: f64,
    pub length_ratio_cutoff: f64,
    pub normalization: Normalization,
    /// `name:/regex/` rules used when `normalization = "custom"`.
    pub variables: Vec<String>,
    pub gap_policy: GapPolicy,
    pub delimiters: String,
    /// Credit for two equal literal tokens (k1).
    pub match_weight: f64,
    /// Credit for two equal placeholder tokens (k2).
    pub variable_weight: f64,
    pub min_members: usize,
    pub reduction: ReductionShape,
    pub failure_policy: FailurePolicy,
    /// Batches clustered concurrently per wave.
    pub parallelism: usize,
    /// Worker threads; 0 means one per CPU.
    pub threads: usize,
    /// Longest line, in tokens, a batch accepts; 0 disables the limit.
    pub max_tokens: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            assign_threshold: 0.6,
            merge_threshold: 0.6,
            length_ratio_cutoff: 1.0,
            normalization: Normalization::None,
            variables: Vec::new(),
            gap_policy: GapPolicy::WildcardPad,
            delimiters: r"\s+".to_string(),
            match_weight: 1.0,
            variable_weight: 1.0,
            min_members: 1,
            reduction: ReductionShape::Balanced,
            failure_policy: FailurePolicy::Abort,
            parallelism: num_cpus::get().max(1),
            threads: 0,
            max_tokens: 4096,
        }
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}

impl ClusterConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: ClusterConfig = toml::from_str(s)?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Rejects any value the engine cannot run with. Called before a job starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::BatchSize(self.batch_size));
        }
        if self.parallelism == 0 {
            return Err(ConfigError::Parallelism(self.parallelism));
        }
        check_unit("assign_threshold", self.assign_threshold)?;
        check_unit("merge_threshold", self.merge_threshold)?;
        check_unit("match_weight", self.match_weight)?;
        check_unit("variable_weight", self.variable_weight)?;
        if !(self.length_ratio_cutoff > 0.0 && self.length_ratio_cutoff <= 1.0) {
            return Err(ConfigError::LengthCutoff(self.length_ratio_cutoff));
        }
        regex::Regex::new(&self.delimiters).map_err(|source| ConfigError::Delimiters {
            pattern: self.delimiters.clone(),
            source,
        })?;
        if self.normalization == Normalization::Custom {
            if self.variables.is_empty() {
                return Err(ConfigError::NoVariables);
            }
            for rule in &self.variables {
                crate::normalize::VariableRule::parse(rule)?;
            }
        }
        Ok(())
    }
}
