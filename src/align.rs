use crate::config::{ClusterConfig, GapPolicy};
use crate::pattern::{Element, Pattern};
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scoring {
    pub matched: i32,
    pub wildcard: i32,
    pub mismatch: i32,
    pub gap: i32,
}

impl Default for Scoring {
    fn default() -> Self {
        Self { matched: 2, wildcard: 0, mismatch: -1, gap: -1 }
    }
}

impl Scoring {
    fn pair(&self, a: &Element, b: &Element) -> i32 {
        match (a, b) {
            (Element::Wildcard, _) | (_, Element::Wildcard) => self.wildcard,
            (Element::Token(x), Element::Token(y)) if x == y => self.matched,
            _ => self.mismatch,
        }
    }
}

/// One column of an alignment, as indices into the two inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Both(usize, usize),
    /// Element of `a` facing a gap in `b`.
    OnlyA(usize),
    /// Element of `b` facing a gap in `a`.
    OnlyB(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Alignment {
    pub score: i32,
    pub a_range: Range<usize>,
    pub b_range: Range<usize>,
    pub columns: Vec<Column>,
}

impl Alignment {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Number of columns pairing two identical concrete tokens.
    pub fn matched_len(&self, a: &[Element], b: &[Element]) -> usize {
        self.columns
            .iter()
            .filter(|c| match **c {
                Column::Both(i, j) => !a[i].is_wildcard() && a[i] == b[j],
                _ => false,
            })
            .count()
    }
}

/// Best-scoring contiguous local alignment of `a` against `b`.
///
/// The first maximal cell in row-major order wins; traceback prefers the
/// diagonal, then a gap in `b`, then a gap in `a`. Returns an empty alignment
/// when no region scores above zero.
pub fn local_alignment(a: &[Element], b: &[Element], scoring: &Scoring) -> Alignment {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        return Alignment::default();
    }
    let width = m + 1;
    let mut h = vec![0i32; (n + 1) * width];
    let mut best = (0usize, 0usize);
    let mut best_score = 0i32;

    for i in 1..=n {
        for j in 1..=m {
            let diag = h[(i - 1) * width + (j - 1)] + scoring.pair(&a[i - 1], &b[j - 1]);
            let up = h[(i - 1) * width + j] + scoring.gap;
            let left = h[i * width + (j - 1)] + scoring.gap;
            let cell = 0.max(diag).max(up).max(left);
            h[i * width + j] = cell;
            if cell > best_score {
                best_score = cell;
                best = (i, j);
            }
        }
    }
    if best_score == 0 {
        return Alignment::default();
    }

    let (end_i, end_j) = best;
    let (mut i, mut j) = best;
    let mut columns = Vec::new();
    while i > 0 && j > 0 && h[i * width + j] > 0 {
        let cell = h[i * width + j];
        if cell == h[(i - 1) * width + (j - 1)] + scoring.pair(&a[i - 1], &b[j - 1]) {
            columns.push(Column::Both(i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if cell == h[(i - 1) * width + j] + scoring.gap {
            columns.push(Column::OnlyA(i - 1));
            i -= 1;
        } else {
            columns.push(Column::OnlyB(j - 1));
            j -= 1;
        }
    }
    columns.reverse();

    Alignment {
        score: best_score,
        a_range: i..end_i,
        b_range: j..end_j,
        columns,
    }
}

// A run of one-sided positions is represented by a single wildcard.
fn push_gap(out: &mut Vec<Element>) {
    if !matches!(out.last(), Some(Element::Wildcard)) {
        out.push(Element::Wildcard);
    }
}

// Context before the core, right-aligned so positions nearest the core pair up.
fn pad_prefix(pa: &[Element], pb: &[Element], out: &mut Vec<Element>) {
    let len = pa.len().max(pb.len());
    for k in 0..len {
        let x = (k + pa.len()).checked_sub(len).map(|i| &pa[i]);
        let y = (k + pb.len()).checked_sub(len).map(|i| &pb[i]);
        match (x, y) {
            (Some(x), Some(y)) => out.push(x.generalize(y)),
            _ => push_gap(out),
        }
    }
}

// Context after the core, left-aligned.
fn pad_suffix(sa: &[Element], sb: &[Element], out: &mut Vec<Element>) {
    let len = sa.len().max(sb.len());
    for k in 0..len {
        match (sa.get(k), sb.get(k)) {
            (Some(x), Some(y)) => out.push(x.generalize(y)),
            _ => push_gap(out),
        }
    }
}

/// Pattern generalization over [`local_alignment`].
///
/// `fold` and `merge_patterns` align the base sequence against the incoming
/// one, keep identical tokens on aligned columns and turn everything else
/// into wildcards. Context around the best local match is padded or
/// truncated according to the [`GapPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Aligner {
    pub scoring: Scoring,
    pub gap_policy: GapPolicy,
}

impl Aligner {
    pub fn new(gap_policy: GapPolicy) -> Self {
        Self { scoring: Scoring::default(), gap_policy }
    }

    pub fn from_config(cfg: &ClusterConfig) -> Self {
        Self::new(cfg.gap_policy)
    }

    /// One-member pattern: the record's tokens, no wildcards.
    pub fn seed(&self, record: &[Element]) -> Pattern {
        Pattern::new(record.to_vec())
    }

    /// Incorporates `record` into `pattern`. Never turns a wildcard back into
    /// a token, so the concrete count can only shrink.
    pub fn fold(&self, pattern: &Pattern, record: &[Element]) -> Pattern {
        Pattern::new(self.generalize(pattern.elements(), record))
    }

    /// Combines patterns of two clusters. The heavier side is the alignment
    /// base; on equal weight `p1` is.
    pub fn merge_patterns(&self, p1: &Pattern, p2: &Pattern, w1: usize, w2: usize) -> Pattern {
        if w2 > w1 {
            Pattern::new(self.generalize(p2.elements(), p1.elements()))
        } else {
            Pattern::new(self.generalize(p1.elements(), p2.elements()))
        }
    }

    fn generalize(&self, a: &[Element], b: &[Element]) -> Vec<Element> {
        let aln = local_alignment(a, b, &self.scoring);
        let mut out = Vec::with_capacity(a.len().max(b.len()));
        if aln.is_empty() {
            pad_suffix(a, b, &mut out);
            return out;
        }

        if self.gap_policy == GapPolicy::WildcardPad {
            pad_prefix(&a[..aln.a_range.start], &b[..aln.b_range.start], &mut out);
        }
        for col in &aln.columns {
            match *col {
                Column::Both(i, j) => out.push(a[i].generalize(&b[j])),
                Column::OnlyA(_) | Column::OnlyB(_) => push_gap(&mut out),
            }
        }
        if self.gap_policy == GapPolicy::WildcardPad {
            pad_suffix(&a[aln.a_range.end..], &b[aln.b_range.end..], &mut out);
        }
        out
    }
}
