use crate::align::Aligner;
use crate::config::ClusterConfig;
use crate::distance::Metric;
use crate::pattern::{Element, Pattern};
use crate::tokenizer::LogRecord;
use ahash::AHashMap;
use itertools::Itertools;
use std::collections::BTreeSet;

pub type ClusterId = u64;
pub type BatchId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: ClusterId,
    /// Tokens of the founding record; the distance representative.
    pub anchor: Vec<Element>,
    pub pattern: Pattern,
    pub count: usize,
    pub origins: BTreeSet<BatchId>,
}

/// Clusters produced by one batch or one merge step, in creation order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterSet {
    clusters: Vec<Cluster>,
    next_id: ClusterId,
    skipped: usize,
}

impl ClusterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn into_clusters(self) -> Vec<Cluster> {
        self.clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Records excluded because they tokenized to nothing.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Sum of member counts.
    pub fn members(&self) -> usize {
        self.clusters.iter().map(|c| c.count).sum()
    }

    pub fn get(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.id == id)
    }

    fn push(&mut self, anchor: Vec<Element>, pattern: Pattern, count: usize, origins: BTreeSet<BatchId>) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.clusters.push(Cluster { id, anchor, pattern, count, origins });
        self.clusters.len() - 1
    }
}

/// Engine parameters shared by every store and merge of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    pub metric: Metric,
    pub aligner: Aligner,
    pub assign_threshold: f64,
    pub merge_threshold: f64,
}

impl ClusterParams {
    pub fn from_config(cfg: &ClusterConfig) -> Self {
        Self {
            metric: Metric::from_config(cfg),
            aligner: Aligner::from_config(cfg),
            assign_threshold: cfg.assign_threshold,
            merge_threshold: cfg.merge_threshold,
        }
    }

    pub fn with_thresholds(assign_threshold: f64, merge_threshold: f64) -> Self {
        Self {
            metric: Metric::default(),
            aligner: Aligner::default(),
            assign_threshold,
            merge_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Assignment {
    Joined { cluster: ClusterId, distance: f64 },
    Seeded(ClusterId),
    Skipped,
}

/// Single-pass clusterer for one batch. Outcomes depend on arrival order.
pub struct ClusterStore {
    batch: BatchId,
    params: ClusterParams,
    set: ClusterSet,
    // anchor length -> indices into `set.clusters`, ascending
    buckets: AHashMap<usize, Vec<usize>>,
}

impl ClusterStore {
    pub fn new(batch: BatchId, params: ClusterParams) -> Self {
        Self { batch, params, set: ClusterSet::new(), buckets: AHashMap::new() }
    }

    pub fn batch(&self) -> BatchId {
        self.batch
    }

    pub fn set(&self) -> &ClusterSet {
        &self.set
    }

    // Buckets can only be skipped when a length cutoff below 1 can reject
    // them and a rejected pair (distance 1) could not join anyway.
    fn prunes_by_length(&self) -> bool {
        self.params.assign_threshold < 1.0 && self.params.metric.length_ratio_cutoff < 1.0
    }

    // Closest cluster within the threshold; `order` must be ascending so the
    // lowest id wins ties.
    fn closest(&self, tokens: &[Element], order: impl Iterator<Item = usize>) -> Option<(usize, f64)> {
        let threshold = self.params.assign_threshold;
        let mut best: Option<(usize, f64)> = None;
        for idx in order {
            let anchor = &self.set.clusters[idx].anchor;
            if let Some(d) = self.params.metric.distance_within(anchor, tokens, threshold) {
                if best.map_or(true, |(_, bd)| d < bd) {
                    best = Some((idx, d));
                }
            }
        }
        best
    }

    pub fn insert(&mut self, record: &LogRecord) -> Assignment {
        if record.is_empty() {
            self.set.skipped += 1;
            return Assignment::Skipped;
        }
        let tokens = &record.tokens;

        let best = if self.prunes_by_length() {
            let metric = &self.params.metric;
            // each bucket is already ascending; kmerge keeps global id order
            let in_range = self
                .buckets
                .iter()
                .filter(|(anchor_len, _)| !metric.rejects_lengths(**anchor_len, tokens.len()))
                .map(|(_, idx)| idx.iter().copied())
                .kmerge();
            self.closest(tokens, in_range)
        } else {
            self.closest(tokens, 0..self.set.clusters.len())
        };

        match best {
            Some((idx, distance)) => {
                let aligner = self.params.aligner;
                let cluster = &mut self.set.clusters[idx];
                cluster.pattern = aligner.fold(&cluster.pattern, tokens);
                cluster.count += 1;
                Assignment::Joined { cluster: cluster.id, distance }
            }
            None => {
                let pattern = self.params.aligner.seed(tokens);
                let origins = BTreeSet::from([self.batch]);
                let idx = self.set.push(tokens.clone(), pattern, 1, origins);
                self.buckets.entry(tokens.len()).or_default().push(idx);
                Assignment::Seeded(self.set.clusters[idx].id)
            }
        }
    }

    pub fn finish(self) -> ClusterSet {
        self.set
    }
}

/// Clusters one batch of records in order.
pub fn cluster_batch<'a, I>(batch: BatchId, records: I, params: ClusterParams) -> ClusterSet
where
    I: IntoIterator<Item = &'a LogRecord>,
{
    let mut store = ClusterStore::new(batch, params);
    for r in records {
        store.insert(r);
    }
    store.finish()
}

/// Folds every cluster of `other` into `base`, in `other`'s creation order.
///
/// A cluster joins the closest base cluster (lowest id on ties) when the
/// anchors are within the merge threshold; otherwise it is appended with a
/// fresh id from `base`'s counter. An empty side is the identity.
pub fn merge_sets(mut base: ClusterSet, other: ClusterSet, params: &ClusterParams) -> ClusterSet {
    if other.is_empty() {
        base.skipped += other.skipped;
        return base;
    }
    if base.is_empty() {
        let mut other = other;
        other.skipped += base.skipped;
        return other;
    }
    base.skipped += other.skipped;

    for incoming in other.clusters {
        let mut best: Option<(usize, f64)> = None;
        for (idx, existing) in base.clusters.iter().enumerate() {
            if let Some(d) = params
                .metric
                .distance_within(&existing.anchor, &incoming.anchor, params.merge_threshold)
            {
                if best.map_or(true, |(_, bd)| d < bd) {
                    best = Some((idx, d));
                }
            }
        }
        match best {
            Some((idx, _)) => {
                let target = &mut base.clusters[idx];
                target.pattern = params.aligner.merge_patterns(
                    &target.pattern,
                    &incoming.pattern,
                    target.count,
                    incoming.count,
                );
                target.count += incoming.count;
                target.origins.extend(incoming.origins);
            }
            None => {
                base.push(incoming.anchor, incoming.pattern, incoming.count, incoming.origins);
            }
        }
    }
    base
}
