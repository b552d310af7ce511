use crate::config::{ClusterConfig, ConfigError, Normalization};
use crate::pattern::Token;
use once_cell::sync::Lazy;
use regex::Regex;

pub const NUM_PLACEHOLDER: &str = "NUM";
pub const HEX_PLACEHOLDER: &str = "HEX";

static RE_NUM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?\d+(?:\.\d+)?$").unwrap()
});

// Numbers carrying a duration/size/percent suffix: 15ms, 2.5s, 120KB, 99%
static RE_NUM_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[-+]?\d+(?:\.\d+)?(?:ms|us|µs|ns|s|m|h|kb|mb|gb|kib|mib|gib|b|%)$").unwrap()
});

static RE_HEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:0[xX])?[0-9a-fA-F]{16,}$").unwrap()
});

/// A named variable: tokens matching `regex` (anchored at the token start)
/// are replaced by the placeholder `<name>`.
#[derive(Debug, Clone)]
pub struct VariableRule {
    pub name: String,
    regex: Regex,
}

impl VariableRule {
    /// Parses `name:/regex/`. The regex itself may contain `:` and `/`.
    pub fn parse(rule: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::Variable {
            rule: rule.to_string(),
            reason: reason.to_string(),
        };
        let (name, wrapped) = rule.split_once(':').ok_or_else(|| invalid("expected name:/regex/"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("empty variable name"));
        }
        let body = wrapped
            .strip_prefix('/')
            .and_then(|s| s.strip_suffix('/'))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid("regex must be wrapped in slashes"))?;
        let regex = Regex::new(&format!("^(?:{body})")).map_err(|e| invalid(&e.to_string()))?;
        Ok(Self { name: name.to_string(), regex })
    }

    pub fn matches(&self, piece: &str) -> bool {
        self.regex.is_match(piece)
    }
}

/// Maps raw token text to a `Token` under the run's normalization mode.
#[derive(Debug, Clone)]
pub struct Normalizer {
    mode: Normalization,
    rules: Vec<VariableRule>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self { mode: Normalization::None, rules: Vec::new() }
    }
}

impl Normalizer {
    pub fn numeric() -> Self {
        Self { mode: Normalization::NumericPlaceholder, rules: Vec::new() }
    }

    pub fn with_rules(rules: Vec<VariableRule>) -> Self {
        Self { mode: Normalization::Custom, rules }
    }

    pub fn from_config(cfg: &ClusterConfig) -> Result<Self, ConfigError> {
        match cfg.normalization {
            Normalization::None => Ok(Self::default()),
            Normalization::NumericPlaceholder => Ok(Self::numeric()),
            Normalization::Custom => {
                if cfg.variables.is_empty() {
                    return Err(ConfigError::NoVariables);
                }
                let rules = cfg
                    .variables
                    .iter()
                    .map(|r| VariableRule::parse(r))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::with_rules(rules))
            }
        }
    }

    pub fn mode(&self) -> Normalization {
        self.mode
    }

    pub fn token(&self, piece: &str) -> Token {
        match self.mode {
            Normalization::None => Token::literal(piece),
            Normalization::NumericPlaceholder => {
                // Order matters: plain numbers before hex so long digit runs stay numeric
                if RE_NUM.is_match(piece) || RE_NUM_UNIT.is_match(piece) {
                    Token::variable(NUM_PLACEHOLDER, piece)
                } else if RE_HEX.is_match(piece) {
                    Token::variable(HEX_PLACEHOLDER, piece)
                } else {
                    Token::literal(piece)
                }
            }
            Normalization::Custom => self
                .rules
                .iter()
                .find(|r| r.matches(piece))
                .map(|r| Token::variable(&r.name, piece))
                .unwrap_or_else(|| Token::literal(piece)),
        }
    }
}
