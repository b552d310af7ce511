use crate::config::{ClusterConfig, ConfigError};
use crate::normalize::Normalizer;
use crate::pattern::Element;
use regex::Regex;

/// Immutable tokenized line. Never contains wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub id: u64,
    pub tokens: Vec<Element>,
}

impl LogRecord {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    delimiters: Regex,
    normalizer: Normalizer,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            delimiters: Regex::new(r"\s+").unwrap(),
            normalizer: Normalizer::default(),
        }
    }
}

impl Tokenizer {
    pub fn new(delimiters: &str, normalizer: Normalizer) -> Result<Self, ConfigError> {
        let delimiters = Regex::new(delimiters).map_err(|source| ConfigError::Delimiters {
            pattern: delimiters.to_string(),
            source,
        })?;
        Ok(Self { delimiters, normalizer })
    }

    pub fn from_config(cfg: &ClusterConfig) -> Result<Self, ConfigError> {
        Self::new(&cfg.delimiters, Normalizer::from_config(cfg)?)
    }

    pub fn tokenize(&self, line: &str) -> Vec<Element> {
        self.delimiters
            .split(line.trim())
            .filter(|piece| !piece.is_empty())
            .map(|piece| Element::Token(self.normalizer.token(piece)))
            .collect()
    }

    pub fn record(&self, id: u64, line: &str) -> LogRecord {
        LogRecord { id, tokens: self.tokenize(line) }
    }
}
