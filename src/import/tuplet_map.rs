//! Tuplet nesting for one (measure, staff, layer)
//!
//! The source stores tuplets as a flat list of time spans. Nesting is
//! recovered from interval containment: an entry's layer is one more than
//! the deepest valid entry strictly containing it. The map is sorted by
//! (begin, layer), so walking it forward visits outer tuplets before the
//! tuplets they contain.
//!
//! Index 0 always holds a sentinel spanning the whole measure. It is never
//! instantiated and serves as the fallback "no tuplet" context.

use crate::diagnostics::{ImportLogger, SourceLocation};
use crate::fraction::Fraction;
use crate::score::TupletKey;
use crate::source::TupletDescriptor;

/// One tuplet descriptor placed in the measure
#[derive(Clone, Debug, PartialEq)]
pub struct TupletMapEntry<'a> {
    /// Measure-relative start
    pub abs_begin: Fraction,
    pub abs_end: Fraction,
    pub abs_duration: Fraction,
    pub descriptor: Option<&'a TupletDescriptor>,
    /// Actual over normal; one for the sentinel and invalid entries
    pub ratio: Fraction,
    pub layer: u32,
    pub created_tuplet: Option<TupletKey>,
    pub valid: bool,
}

impl<'a> TupletMapEntry<'a> {
    fn sentinel(measure_len: Fraction) -> Self {
        Self {
            abs_begin: Fraction::ZERO,
            abs_end: measure_len,
            abs_duration: measure_len,
            descriptor: None,
            ratio: Fraction::ONE,
            layer: 0,
            created_tuplet: None,
            valid: false,
        }
    }

    fn invalid(descriptor: &'a TupletDescriptor) -> Self {
        let unplaced = Fraction::from_integer(-1).unwrap_or(Fraction::ZERO);
        Self {
            abs_begin: unplaced,
            abs_end: unplaced,
            abs_duration: Fraction::ZERO,
            descriptor: Some(descriptor),
            ratio: Fraction::ONE,
            layer: 0,
            created_tuplet: None,
            valid: false,
        }
    }

    /// `self` contains `other`, and is not the same span
    pub fn strictly_contains(&self, other: &TupletMapEntry) -> bool {
        self.abs_begin <= other.abs_begin
            && other.abs_end <= self.abs_end
            && (self.abs_begin, self.abs_end) != (other.abs_begin, other.abs_end)
    }

    pub fn contains(&self, other: &TupletMapEntry) -> bool {
        self.abs_begin <= other.abs_begin && other.abs_end <= self.abs_end
    }

    pub fn covers(&self, position: Fraction) -> bool {
        self.abs_begin <= position && position < self.abs_end
    }
}

/// Maximal time range sharing the same innermost tuplet
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BottomInterval {
    pub start: Fraction,
    pub end: Fraction,
    /// Map index of the innermost tuplet; 0 when none covers the range
    pub index: usize,
    pub tuplet: Option<TupletKey>,
    /// Product of the ratios from the innermost tuplet outward
    pub ratio: Fraction,
}

/// Measure-relative span of a two-chord tremolo
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TremoloSpan {
    pub begin: Fraction,
    pub end: Fraction,
}

/// Reusable tuplet map, rebuilt for every (measure, staff, layer)
#[derive(Debug, Default)]
pub struct TupletMap<'a> {
    entries: Vec<TupletMapEntry<'a>>,
    tremolos: Vec<TremoloSpan>,
    measure_len: Fraction,
}

impl<'a> TupletMap<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the map and fill it from `descriptors`.
    ///
    /// Tremolo descriptors are kept apart and never become map entries.
    pub fn rebuild(
        &mut self,
        descriptors: &'a [TupletDescriptor],
        measure_len: Fraction,
        logger: &mut ImportLogger,
        location: SourceLocation,
    ) {
        self.entries.clear();
        self.tremolos.clear();
        self.measure_len = measure_len;

        let mut placed = Vec::with_capacity(descriptors.len() + 1);
        for descriptor in descriptors {
            if descriptor.ratio.0 == 0 {
                logger.info(location, "tuplet_skipped", "Tuplet with zero ratio skipped");
                continue;
            }
            if descriptor.tremolo {
                match Self::place(descriptor) {
                    Some(entry) => self.tremolos.push(TremoloSpan {
                        begin: entry.abs_begin,
                        end: entry.abs_end,
                    }),
                    None => logger.warn(location, "tremolo_invalid", "Tremolo span cannot be placed on a tick, ignored"),
                }
                continue;
            }
            match Self::place(descriptor) {
                Some(entry) => placed.push(entry),
                None => {
                    logger.warn(
                        location,
                        "tuplet_invalid",
                        format!(
                            "Tuplet [{}/{}, {}/{}) cannot be placed on a tick, ignored",
                            descriptor.start.0, descriptor.start.1, descriptor.end.0, descriptor.end.1
                        ),
                    );
                    placed.push(TupletMapEntry::invalid(descriptor));
                }
            }
        }

        // Containers are longer than their contents, so longest first
        // guarantees every container has its layer before it is needed.
        let mut by_duration: Vec<usize> = (0..placed.len()).filter(|i| placed[*i].valid).collect();
        by_duration.sort_by(|a, b| placed[*b].abs_duration.cmp(&placed[*a].abs_duration));
        for (n, &i) in by_duration.iter().enumerate() {
            let layer = by_duration[..n]
                .iter()
                .filter(|&&j| placed[j].strictly_contains(&placed[i]))
                .map(|&j| placed[j].layer + 1)
                .max()
                .unwrap_or(0);
            placed[i].layer = layer;
        }

        placed.sort_by(|a, b| (a.abs_begin, a.layer).cmp(&(b.abs_begin, b.layer)));
        self.entries.push(TupletMapEntry::sentinel(measure_len));
        self.entries.extend(placed);
    }

    fn place(descriptor: &'a TupletDescriptor) -> Option<TupletMapEntry<'a>> {
        let begin = descriptor.start.resolve()?;
        let end = descriptor.end.resolve()?;
        let ratio = descriptor.ratio.resolve_ratio().filter(|r| r.is_positive())?;
        let duration = end.checked_sub(begin).ok().filter(|d| d.is_positive())?;
        Some(TupletMapEntry {
            abs_begin: begin,
            abs_end: end,
            abs_duration: duration,
            descriptor: Some(descriptor),
            ratio,
            layer: 0,
            created_tuplet: None,
            valid: true,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn entries(&self) -> &[TupletMapEntry<'a>] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&TupletMapEntry<'a>> {
        self.entries.get(index)
    }

    pub fn tremolos(&self) -> &[TremoloSpan] {
        &self.tremolos
    }

    pub fn measure_len(&self) -> Fraction {
        self.measure_len
    }

    pub fn set_created(&mut self, index: usize, tuplet: TupletKey) {
        if let Some(entry) = self.entries.get_mut(index) {
            if entry.created_tuplet.is_none() {
                entry.created_tuplet = Some(tuplet);
            }
        }
    }

    /// Nearest earlier valid entry one layer up that contains `index`; 0 if none
    pub fn index_of_parent(&self, index: usize) -> usize {
        let Some(entry) = self.entries.get(index) else {
            return 0;
        };
        (1..index)
            .rev()
            .find(|&i| {
                let candidate = &self.entries[i];
                candidate.valid && candidate.layer + 1 == entry.layer && candidate.contains(entry)
            })
            .unwrap_or(0)
    }

    /// Ratio product of the ancestors of `index`, excluding itself
    pub fn ancestor_ratio(&self, index: usize) -> Fraction {
        let mut ratio = Fraction::ONE;
        let mut current = self.index_of_parent(index);
        while current != 0 {
            ratio = ratio.checked_mul(self.entries[current].ratio).unwrap_or(ratio);
            current = self.index_of_parent(current);
        }
        ratio
    }

    /// Ratio product of `index` and all its ancestors
    pub fn chain_ratio(&self, index: usize) -> Fraction {
        let own = self.entries.get(index).map_or(Fraction::ONE, |e| e.ratio);
        own.checked_mul(self.ancestor_ratio(index)).unwrap_or(own)
    }

    /// Innermost instantiated tuplet covering `position`, scanning back from `from`
    pub fn innermost_created(&self, position: Fraction, from: usize) -> Option<usize> {
        let upper = from.min(self.entries.len().saturating_sub(1));
        (1..=upper).rev().find(|&i| {
            let entry = &self.entries[i];
            entry.valid && entry.created_tuplet.is_some() && entry.covers(position)
        })
    }

    /// Innermost valid entry covering the whole of `[start, end)`; 0 if none.
    /// Equal depth goes to the first in map order.
    fn bottom_for(&self, start: Fraction, end: Fraction) -> usize {
        let mut best = 0;
        for (i, entry) in self.entries.iter().enumerate().skip(1) {
            if !entry.valid || entry.abs_begin > start || entry.abs_end < end {
                continue;
            }
            if best == 0 || entry.layer > self.entries[best].layer {
                best = i;
            }
        }
        best
    }

    /// Partition of `[0, measure length)` by innermost covering tuplet
    pub fn bottom_intervals(&self) -> Vec<BottomInterval> {
        let mut bounds = vec![Fraction::ZERO, self.measure_len];
        for entry in self.entries.iter().skip(1).filter(|e| e.valid) {
            for bound in [entry.abs_begin, entry.abs_end] {
                if bound > Fraction::ZERO && bound < self.measure_len {
                    bounds.push(bound);
                }
            }
        }
        bounds.sort();
        bounds.dedup();

        let mut intervals: Vec<BottomInterval> = Vec::with_capacity(bounds.len());
        for pair in bounds.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            let index = self.bottom_for(start, end);
            if let Some(last) = intervals.last_mut() {
                if last.index == index {
                    last.end = end;
                    continue;
                }
            }
            intervals.push(BottomInterval {
                start,
                end,
                index,
                tuplet: self.entries[index].created_tuplet,
                ratio: if index == 0 { Fraction::ONE } else { self.chain_ratio(index) },
            });
        }
        intervals
    }
}
