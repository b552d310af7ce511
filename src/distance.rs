use crate::config::ClusterConfig;
use crate::pattern::Element;

// Slack for early exit so partial sums never reject a distance that the full
// scan would accept.
const EARLY_EXIT_SLACK: f64 = 1e-9;

/// Positional dissimilarity between element sequences.
///
/// Wildcards on either side cost nothing, equal tokens cost `1 - weight`,
/// anything else costs 1, as does every unaligned tail position. The total is
/// normalized by the longer length, so the result always lies in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metric {
    pub length_ratio_cutoff: f64,
    pub match_weight: f64,
    pub variable_weight: f64,
}

impl Default for Metric {
    fn default() -> Self {
        Self { length_ratio_cutoff: 1.0, match_weight: 1.0, variable_weight: 1.0 }
    }
}

impl Metric {
    pub fn from_config(cfg: &ClusterConfig) -> Self {
        Self {
            length_ratio_cutoff: cfg.length_ratio_cutoff,
            match_weight: cfg.match_weight,
            variable_weight: cfg.variable_weight,
        }
    }

    fn cost(&self, a: &Element, b: &Element) -> f64 {
        match (a, b) {
            (Element::Wildcard, _) | (_, Element::Wildcard) => 0.0,
            (Element::Token(x), Element::Token(y)) if x == y => {
                if x.is_placeholder() {
                    1.0 - self.variable_weight
                } else {
                    1.0 - self.match_weight
                }
            }
            _ => 1.0,
        }
    }

    /// True when the length difference alone already rules the pair out.
    pub fn rejects_lengths(&self, len_a: usize, len_b: usize) -> bool {
        let max_len = len_a.max(len_b);
        if max_len == 0 {
            return false;
        }
        let diff = len_a.abs_diff(len_b);
        diff as f64 / max_len as f64 > self.length_ratio_cutoff
    }

    /// `a` is the representative side (pattern or anchor), `b` the candidate.
    pub fn distance(&self, a: &[Element], b: &[Element]) -> f64 {
        let max_len = a.len().max(b.len());
        if max_len == 0 {
            return 0.0;
        }
        if self.rejects_lengths(a.len(), b.len()) {
            return 1.0;
        }
        let mut total = a.len().abs_diff(b.len()) as f64;
        for (x, y) in a.iter().zip(b.iter()) {
            total += self.cost(x, y);
        }
        (total / max_len as f64).clamp(0.0, 1.0)
    }

    /// Same value as [`Metric::distance`] when it is `<= limit`, `None`
    /// otherwise. Stops scanning once the limit is out of reach.
    pub fn distance_within(&self, a: &[Element], b: &[Element], limit: f64) -> Option<f64> {
        let max_len = a.len().max(b.len());
        if max_len == 0 {
            return (0.0 <= limit).then_some(0.0);
        }
        if self.rejects_lengths(a.len(), b.len()) {
            return (1.0 <= limit).then_some(1.0);
        }
        let budget = limit * max_len as f64 + EARLY_EXIT_SLACK;
        let mut total = a.len().abs_diff(b.len()) as f64;
        if total > budget {
            return None;
        }
        for (x, y) in a.iter().zip(b.iter()) {
            total += self.cost(x, y);
            if total > budget {
                return None;
            }
        }
        let d = (total / max_len as f64).clamp(0.0, 1.0);
        (d <= limit).then_some(d)
    }
}

/// Distance under the default metric (no length cutoff, unit weights).
pub fn distance(a: &[Element], b: &[Element]) -> f64 {
    Metric::default().distance(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Token;

    fn words(s: &str) -> Vec<Element> {
        s.split_whitespace().map(Element::literal).collect()
    }

    #[test]
    fn bounded_scan_agrees_with_full_scan() {
        let m = Metric::default();
        let a = words("a b c d e");
        let b = words("a x c y e");
        let d = m.distance(&a, &b);
        assert_eq!(m.distance_within(&a, &b, 0.4), Some(d));
        assert_eq!(m.distance_within(&a, &b, 0.39), None);
    }

    #[test]
    fn placeholder_matches_use_variable_weight() {
        let m = Metric { variable_weight: 0.5, ..Metric::default() };
        let a = vec![Element::literal("id"), Element::Token(Token::placeholder("NUM"))];
        let b = a.clone();
        assert!((m.distance(&a, &b) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn length_cutoff_short_circuits() {
        let m = Metric { length_ratio_cutoff: 0.3, ..Metric::default() };
        assert_eq!(m.distance(&words("a b c d"), &words("a b")), 1.0);
        assert_eq!(m.distance_within(&words("a b c d"), &words("a b"), 0.9), None);
    }
}
