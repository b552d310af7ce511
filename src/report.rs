use crate::cluster::{BatchId, ClusterId};
use crate::config::ReductionShape;
use crate::pattern::{Element, Pattern};
use crate::pipeline::{FailedBatch, JobOutcome};
use chrono::SecondsFormat;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Marker used for wildcards in the `template` field.
pub const WILDCARD_MARKER: &str = "<*>";

const CRED: &str = "\x1b[31m";
const CYELLOW: &str = "\x1b[33m";
const CEND: &str = "\x1b[0m";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_records: usize,
    pub clustered_records: usize,
    pub skipped_records: usize,
    /// Members of clusters dropped by `min_members`.
    pub filtered_records: usize,
    pub unique_patterns: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub reduction: ReductionShape,
    pub cancelled: bool,
    pub started_at: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterOut {
    pub id: ClusterId,
    pub template: String,
    /// Pattern elements; `null` marks a wildcard.
    pub pattern: Vec<Option<String>>,
    pub count: usize,
    /// Founding record, variable values restored.
    pub example: String,
    pub batches: Vec<BatchId>,
    #[serde(skip)]
    pub elements: Vec<Element>,
    #[serde(skip)]
    pub anchor: Vec<Element>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterReport {
    pub summary: ReportSummary,
    pub clusters: Vec<ClusterOut>,
    pub failures: Vec<FailedBatch>,
}

impl ClusterReport {
    pub fn from_outcome(outcome: JobOutcome, min_members: usize) -> Self {
        let skipped_records = outcome.clusters.skipped();
        let clustered_records = outcome.clusters.members();
        let mut filtered_records = 0usize;
        let mut clusters = Vec::with_capacity(outcome.clusters.len());

        for c in outcome.clusters.into_clusters() {
            if c.count < min_members {
                filtered_records += c.count;
                continue;
            }
            let example = Pattern::new(c.anchor.clone()).render_values("*");
            clusters.push(ClusterOut {
                id: c.id,
                template: c.pattern.render(WILDCARD_MARKER),
                pattern: c.pattern.to_texts(),
                count: c.count,
                example,
                batches: c.origins.into_iter().collect(),
                elements: c.pattern.into_elements(),
                anchor: c.anchor,
            });
        }

        let summary = ReportSummary {
            total_records: outcome.total_records,
            clustered_records,
            skipped_records,
            filtered_records,
            unique_patterns: clusters.len(),
            batches: outcome.batches,
            failed_batches: outcome.failed_batches.len(),
            reduction: outcome.reduction,
            cancelled: outcome.cancelled,
            started_at: outcome.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            elapsed_ms: outcome.elapsed.as_millis() as u64,
        };
        Self { summary, clusters, failures: outcome.failed_batches }
    }

    pub fn find(&self, template: &str) -> Option<&ClusterOut> {
        self.clusters.iter().find(|c| c.template == template)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    None,
    Desc,
    Asc,
}

#[derive(Debug, Clone)]
pub struct TextOptions {
    pub sort: SortOrder,
    /// Right-align the count column to the widest count.
    pub number_align: bool,
    /// Text shown for wildcards. `None` shows the founding record's value
    /// where the pattern still lines up with it.
    pub placeholder: Option<String>,
    /// Print the founding record's value for variables instead of `<name>`.
    pub mask_variables: bool,
    pub highlight_patterns: bool,
    pub highlight_variables: bool,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            sort: SortOrder::None,
            number_align: false,
            placeholder: Some("---".to_string()),
            mask_variables: false,
            highlight_patterns: false,
            highlight_variables: false,
        }
    }
}

fn anchor_value(c: &ClusterOut, i: usize) -> &str {
    c.anchor[i].as_token().map_or("---", |t| t.value())
}

fn render_cluster(c: &ClusterOut, opts: &TextOptions) -> String {
    let aligned_with_anchor = c.anchor.len() == c.elements.len();
    c.elements
        .iter()
        .enumerate()
        .map(|(i, e)| match e {
            Element::Wildcard => {
                let value = match (&opts.placeholder, aligned_with_anchor) {
                    (Some(p), _) => p.clone(),
                    (None, true) => anchor_value(c, i).to_string(),
                    (None, false) => "---".to_string(),
                };
                if opts.highlight_patterns { format!("{CRED}{value}{CEND}") } else { value }
            }
            Element::Token(t) if t.is_placeholder() => {
                let value = match (opts.mask_variables, aligned_with_anchor) {
                    (false, _) => t.text(),
                    (true, true) => anchor_value(c, i),
                    (true, false) => t.value(),
                };
                if opts.highlight_variables { format!("{CYELLOW}{value}{CEND}") } else { value.to_string() }
            }
            Element::Token(t) => t.text().to_string(),
        })
        .join(" ")
}

/// One line per cluster: count, then the pattern.
pub fn render_text(report: &ClusterReport, opts: &TextOptions) -> String {
    let ordered: Vec<&ClusterOut> = match opts.sort {
        SortOrder::None => report.clusters.iter().collect(),
        SortOrder::Desc => report.clusters.iter().sorted_by(|a, b| b.count.cmp(&a.count)).collect(),
        SortOrder::Asc => report.clusters.iter().sorted_by(|a, b| a.count.cmp(&b.count)).collect(),
    };
    let width = if opts.number_align {
        ordered.iter().map(|c| c.count.to_string().len()).max().unwrap_or(0)
    } else {
        0
    };
    let mut out = String::new();
    for c in ordered {
        out.push_str(&format!("{:>width$} {}\n", c.count, render_cluster(c, opts), width = width));
    }
    out
}
