//! Percentage breakdown of a classification result.

use crate::descriptor;
use crate::types::ExpressionScores;
use serde::Serialize;
use std::cmp::Ordering;

/// Bars whose rounded percentage falls below this are left out entirely.
pub const MIN_VISIBLE_PERCENT: u8 = 1;

/// One bar of the breakdown chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartBar {
    pub key: String,
    /// Descriptor label, or the raw key for unknown categories.
    pub label: String,
    /// Descriptor icon; `None` for unknown categories.
    pub icon: Option<String>,
    pub percent: u8,
}

/// Round a [0, 1] score to a whole percentage.
pub fn percent_of(score: f32) -> u8 {
    (score.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Build the chart: every category by descending score, ties in key order,
/// with sub-1% entries dropped.
pub fn build_chart(scores: &ExpressionScores) -> Vec<ChartBar> {
    let mut entries: Vec<_> = scores.iter().collect();
    entries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    entries
        .into_iter()
        .filter_map(|entry| {
            let percent = percent_of(entry.score);
            if percent < MIN_VISIBLE_PERCENT {
                return None;
            }
            let (label, icon) = match descriptor::lookup(&entry.key) {
                Some(d) => (d.label.clone(), Some(d.icon.clone())),
                None => (entry.key.clone(), None),
            };
            Some(ChartBar {
                key: entry.key.clone(),
                label,
                icon,
                percent,
            })
        })
        .collect()
}
