//! Aggregation primitives
//!
//! Grouping, ranking and the small numeric folds reports are built from.
//! Everything here is deterministic: groups come back ordered by key, and
//! rankings break ties by label.

use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Group records by key, folding each group into an accumulator.
///
/// Records whose key is `None` are skipped. Groups are returned in ascending
/// key order.
pub fn group_by<T, K, A, F, G>(
    records: impl IntoIterator<Item = T>,
    key_fn: F,
    mut fold: G,
) -> Vec<(K, A)>
where
    K: Ord,
    A: Default,
    F: Fn(&T) -> Option<K>,
    G: FnMut(&mut A, T),
{
    let mut groups: BTreeMap<K, A> = BTreeMap::new();
    for record in records {
        if let Some(key) = key_fn(&record) {
            fold(groups.entry(key).or_default(), record);
        }
    }
    groups.into_iter().collect()
}

/// Order groups by a metric, highest first; ties by label ascending
pub fn rank_by<K, A, M, L>(mut groups: Vec<(K, A)>, metric: M, label: L) -> Vec<(K, A)>
where
    M: Fn(&A) -> f64,
    L: Fn(&K) -> &str,
{
    groups.sort_by(|(ka, a), (kb, b)| {
        metric(b)
            .partial_cmp(&metric(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| label(ka).cmp(label(kb)))
    });
    groups
}

/// Count and running sum
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tally {
    pub count: u64,
    pub sum: f64,
}

impl Tally {
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
    }

    /// Mean of the added values
    pub fn mean(&self) -> Option<f64> {
        ratio(self.sum, self.count as f64)
    }
}

/// Mean of the present values; `None` when there are none
pub fn mean(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let mut tally = Tally::default();
    for v in values.into_iter().flatten() {
        tally.add(v);
    }
    tally.mean()
}

/// `num / den`, or `None` for a zero denominator
pub fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

/// Round half away from zero to `places` decimals
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    let rounded = (value * factor).round() / factor;
    // avoid "-0" in output
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
