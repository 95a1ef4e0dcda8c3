//! System layout seam
//!
//! The importer needs exactly one thing from layout: which systems a
//! spanner crosses, so endpoint offsets can be applied to the first and
//! last spanner segment.

use super::types::{Spanner, SpannerSegment, SpannerSegmentType};
use super::Score;

/// Layout engine run once after import, before spanner positioning
pub trait LayoutEngine {
    /// System number of every measure, in score order
    fn systems(&self, score: &Score) -> Vec<usize>;

    /// Split a spanner into one segment per system it crosses
    fn spanner_segments(&self, score: &Score, spanner: &Spanner) -> Vec<SpannerSegment> {
        let systems = self.systems(score);
        let system_at = |tick| {
            score
                .tick2measure(tick)
                .and_then(|m| score.measure_index(m))
                .or_else(|| score.measure_keys().len().checked_sub(1))
                .and_then(|i| systems.get(i).copied())
        };
        let (Some(first), Some(last)) = (system_at(spanner.tick), system_at(spanner.tick2)) else {
            return Vec::new();
        };
        let last = last.max(first);

        (first..=last)
            .map(|system| {
                let kind = match (system == first, system == last) {
                    (true, true) => SpannerSegmentType::Single,
                    (true, false) => SpannerSegmentType::Begin,
                    (false, true) => SpannerSegmentType::End,
                    (false, false) => SpannerSegmentType::Middle,
                };
                SpannerSegment {
                    system,
                    kind,
                    offset: (0.0, 0.0),
                    offset2: (0.0, 0.0),
                }
            })
            .collect()
    }
}

/// Fixed number of measures per system
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemLayout {
    pub measures_per_system: usize,
}

impl SystemLayout {
    pub fn new(measures_per_system: usize) -> Self {
        Self {
            measures_per_system: measures_per_system.max(1),
        }
    }
}

impl Default for SystemLayout {
    fn default() -> Self {
        Self::new(4)
    }
}

impl LayoutEngine for SystemLayout {
    fn systems(&self, score: &Score) -> Vec<usize> {
        let per_system = self.measures_per_system.max(1);
        (0..score.measure_keys().len()).map(|i| i / per_system).collect()
    }
}
