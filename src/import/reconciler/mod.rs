//! Entry stream reconciliation
//!
//! Source entries carry measure-relative start positions. The destination
//! places chords and rests into segments, one after the other, on absolute
//! ticks. The reconciler walks one voice's entries with a cursor that
//! tracks where the next element is expected:
//!
//! ```text
//!               ┌─────────────────────┐
//!   ┌──────────▶│ AtExpectedPosition  │◀──────────────┐
//!   │           └──────────┬──────────┘               │
//!   │     start > cursor   │   start < cursor, start=0│
//!   │   ┌──────────────────┼──────────────────┐       │
//!   │   ▼                  │                  ▼       │
//!   │ GapBeforeEntry       │      MeasureBoundaryRecovery
//!   │   │ (invisible rests)│                  │       │
//!   │   └─────────┬────────┘──────────────────┘       │
//!   │             ▼                                   │
//!   │        EntryPlaced ─────────────────────────────┘
//!   │             │ no more entries
//!   │             ▼
//!   └──────────  Done
//! ```
//!
//! Tuplets are instantiated top-down as the cursor reaches their start.
//! A failing entry never stops the pass, except when its position is
//! unknown: everything after it would be misplaced.

pub mod gap;

pub use gap::fill_with_invisible_rests;

use super::convert;
use super::entries::{EntryImporter, EntryTarget};
use super::tuplet_map::TupletMap;
use crate::diagnostics::{ImportLogger, SourceLocation};
use crate::errors::{EntryError, ScoreError};
use crate::fraction::Fraction;
use crate::score::{
    staff2track, ChordRestKey, Clef, MeasureKey, Score, SegmentKey, SegmentType, TrackIndex, TupletKey,
};
use crate::source::{ClefChange, SourceEntry, TupletDisplay};

/// Where the next chord or rest of a voice is expected
#[derive(Clone, Debug, PartialEq)]
pub struct EntryCursor {
    /// Relative to `measure_start_tick`
    pub expected_position: Fraction,
    pub measure_start_tick: Fraction,
    /// ChordRest segment at the expected position; `None` past the last measure
    pub current_segment: Option<SegmentKey>,
    pub track_index: TrackIndex,
    pub last_active_tuplet_index: usize,
}

impl EntryCursor {
    /// Cursor at the first tick of `measure`
    pub fn new(score: &mut Score, measure: MeasureKey, track: TrackIndex) -> Result<Self, ScoreError> {
        let tick = score
            .measure(measure)
            .map(|m| m.tick)
            .ok_or(ScoreError::StaleHandle("measure"))?;
        let segment = score.segment_at(measure, SegmentType::ChordRest, tick)?;
        Ok(Self {
            expected_position: Fraction::ZERO,
            measure_start_tick: tick,
            current_segment: Some(segment),
            track_index: track,
            last_active_tuplet_index: 0,
        })
    }

    pub fn tick(&self) -> Result<Fraction, EntryError> {
        Ok(self.measure_start_tick.checked_add(self.expected_position)?)
    }

    pub fn measure(&self, score: &Score) -> Option<MeasureKey> {
        score.tick2measure(self.measure_start_tick)
    }

    pub fn advance(&mut self, score: &mut Score, by: Fraction) -> Result<(), EntryError> {
        self.expected_position = self.expected_position.checked_add(by)?;
        self.reacquire(score)
    }

    /// Move to the start of the following measure
    fn next_measure(&mut self, score: &mut Score) -> Result<(), EntryError> {
        let next_start = self
            .measure(score)
            .and_then(|m| score.measure(m))
            .map(|m| m.end_tick())
            .ok_or(ScoreError::NoMeasureAt {
                tick: self.measure_start_tick,
            })?;
        self.measure_start_tick = next_start;
        self.expected_position = Fraction::ZERO;
        self.last_active_tuplet_index = 0;
        self.reacquire(score)
    }

    fn reacquire(&mut self, score: &mut Score) -> Result<(), EntryError> {
        let tick = self.tick()?;
        self.current_segment = match score.tick2measure(tick) {
            Some(measure) => Some(score.segment_at(measure, SegmentType::ChordRest, tick)?),
            None => None,
        };
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcilerState {
    AtExpectedPosition,
    GapBeforeEntry,
    EntryPlaced,
    MeasureBoundaryRecovery,
    Done,
}

/// Outcome of one voice in one measure
#[derive(Debug)]
pub struct VoicePass<'e> {
    /// Entries that became chords or rests, in order
    pub placed: Vec<(&'e SourceEntry, ChordRestKey)>,
    pub skipped: usize,
    pub failed: usize,
    /// Set when an entry's position was unknown and the rest of the voice was dropped
    pub aborted: bool,
    pub cursor: EntryCursor,
    pub state: ReconcilerState,
}

/// Place the entries of one (measure, staff, layer) on `target.track`
#[allow(clippy::too_many_arguments)]
pub fn reconcile_voice<'e>(
    score: &mut Score,
    map: &mut TupletMap<'_>,
    importer: &mut EntryImporter<'_>,
    measure: MeasureKey,
    entries: &'e [SourceEntry],
    target: EntryTarget,
    logger: &mut ImportLogger,
) -> Result<VoicePass<'e>, ScoreError> {
    let cursor = EntryCursor::new(score, measure, target.track)?;
    let mut reconciler = Reconciler {
        score,
        map,
        importer,
        logger,
        target,
        cursor,
        state: ReconcilerState::AtExpectedPosition,
    };
    let mut pass = VoicePass {
        placed: Vec::new(),
        skipped: 0,
        failed: 0,
        aborted: false,
        cursor: reconciler.cursor.clone(),
        state: ReconcilerState::AtExpectedPosition,
    };

    for entry in entries {
        match reconciler.step(entry) {
            Ok(Some(key)) => pass.placed.push((entry, key)),
            Ok(None) => pass.skipped += 1,
            Err(err @ EntryError::PositionUnknown { .. }) => {
                reconciler.logger.error(target.location, "voice_aborted", err.to_string());
                pass.aborted = true;
                break;
            }
            Err(err @ EntryError::UnsupportedDuration { .. }) => {
                // already reported by the entry importer
                log::debug!("{}", err);
                pass.failed += 1;
            }
            Err(err) => {
                reconciler.logger.warn(target.location, "entry_failed", err.to_string());
                pass.failed += 1;
            }
        }
    }

    reconciler.state = ReconcilerState::Done;
    pass.cursor = reconciler.cursor;
    pass.state = reconciler.state;
    Ok(pass)
}

struct Reconciler<'r, 'a, 'i> {
    score: &'r mut Score,
    map: &'r mut TupletMap<'a>,
    importer: &'r mut EntryImporter<'i>,
    logger: &'r mut ImportLogger,
    target: EntryTarget,
    cursor: EntryCursor,
    state: ReconcilerState,
}

impl Reconciler<'_, '_, '_> {
    fn step(&mut self, entry: &SourceEntry) -> Result<Option<ChordRestKey>, EntryError> {
        let location = self.target.location;
        self.state = ReconcilerState::AtExpectedPosition;

        let (Some(start), Some(actual)) = (entry.elapsed.resolve(), entry.actual_duration.resolve()) else {
            return Err(EntryError::PositionUnknown { entry: entry.number });
        };

        if entry.grace_index != 0 {
            self.logger.warn(
                location,
                "grace_skipped",
                format!("Entry {}: grace notes are not imported", entry.number),
            );
            return Ok(None);
        }
        if entry.v2_launch || entry.voice2 {
            self.logger.warn(
                location,
                "voice2_skipped",
                format!("Entry {}: voice 2 content is not imported", entry.number),
            );
            return Ok(None);
        }

        let position = self.cursor.expected_position;
        if position < start {
            self.state = ReconcilerState::GapBeforeEntry;
            let gap = start.checked_sub(position)?;
            self.logger.info(
                location,
                "gap_filled",
                format!("Entry {}: {} before the entry filled with invisible rests", entry.number, gap),
            );
            self.fill(position, gap)?;
            self.cursor.advance(self.score, gap)?;
        } else if position > start {
            if !start.is_zero() {
                return Err(EntryError::IncorrectPosition {
                    entry: entry.number,
                    expected: start,
                    found: position,
                });
            }
            self.state = ReconcilerState::MeasureBoundaryRecovery;
            self.logger.warn(
                location,
                "measure_boundary",
                format!("Entry {}: measure-start entry reached late, continuing in the next measure", entry.number),
            );
            let measure_len = self
                .cursor
                .measure(self.score)
                .and_then(|m| self.score.measure(m))
                .map_or(Fraction::ZERO, |m| m.ticks);
            if position < measure_len {
                self.fill(position, measure_len.checked_sub(position)?)?;
            }
            self.cursor.next_measure(self.score)?;
            // tuplets of the previous measure no longer apply
            let next_len = self
                .cursor
                .measure(self.score)
                .and_then(|m| self.score.measure(m))
                .map_or(Fraction::ZERO, |m| m.ticks);
            self.map.rebuild(&[], next_len, self.logger, location);
        }

        let position = self.cursor.expected_position;
        self.instantiate_tuplets_at(position)?;
        let parent = self
            .map
            .innermost_created(position, self.cursor.last_active_tuplet_index)
            .and_then(|i| self.map.get(i))
            .and_then(|e| e.created_tuplet);

        let Some(prepared) = self.importer.import_entry(self.score, entry, self.target, self.logger) else {
            self.fill(position, actual)?;
            self.cursor.advance(self.score, actual)?;
            return Err(EntryError::UnsupportedDuration { entry: entry.number });
        };
        let segment = self.cursor.current_segment.ok_or(EntryError::MissingSegment {
            tick: self.cursor.tick()?,
        })?;
        let key = self
            .importer
            .place(self.score, prepared, segment, actual, self.logger, location)?;
        if let Some(tuplet) = parent {
            self.score.add_to_tuplet(tuplet, key)?;
        }

        self.cursor.advance(self.score, actual)?;
        self.state = ReconcilerState::EntryPlaced;
        if let Some(change) = entry.clef_change {
            self.insert_clef(change)?;
        }
        Ok(Some(key))
    }

    fn fill(&mut self, position: Fraction, length: Fraction) -> Result<(), EntryError> {
        let measure = self
            .cursor
            .measure(self.score)
            .ok_or(ScoreError::NoMeasureAt {
                tick: self.cursor.measure_start_tick,
            })?;
        fill_with_invisible_rests(
            self.score,
            self.map,
            measure,
            position,
            self.cursor.track_index,
            length,
            self.target.location,
            self.logger,
        )?;
        Ok(())
    }

    /// Create every tuplet starting at `position`, outermost first
    fn instantiate_tuplets_at(&mut self, position: Fraction) -> Result<(), EntryError> {
        let Some(measure) = self.cursor.measure(self.score) else {
            return Ok(());
        };
        for index in 1..self.map.len() {
            let Some(entry) = self.map.get(index) else {
                break;
            };
            if !entry.valid {
                continue;
            }
            if entry.abs_begin > position {
                break;
            }
            self.cursor.last_active_tuplet_index = index;
            if entry.abs_begin == position && entry.created_tuplet.is_none() {
                ensure_tuplet(
                    self.score,
                    self.map,
                    index,
                    measure,
                    self.cursor.track_index,
                    self.target.location,
                    self.logger,
                )?;
            }
        }
        Ok(())
    }

    fn insert_clef(&mut self, change: ClefChange) -> Result<(), EntryError> {
        let location = self.target.location;
        let Some(kind) = convert::clef_type(change.clef_index) else {
            self.logger.warn(
                location,
                "clef_unsupported",
                format!("Clef index {} not supported", change.clef_index),
            );
            return Ok(());
        };
        let tick = self.cursor.tick()?;
        let Some(measure) = self.score.tick2measure(tick) else {
            self.logger.info(location, "clef_dropped", "Clef change after the last measure dropped");
            return Ok(());
        };
        let kind_of_segment = if tick.is_zero() {
            SegmentType::HeaderClef
        } else {
            SegmentType::Clef
        };
        let segment = self.score.segment_at(measure, kind_of_segment, tick)?;
        let clef = Clef {
            segment,
            track: staff2track(self.target.staff),
            kind,
            visible: !change.hidden,
            generated: change.generated,
        };
        match self.score.add_clef(segment, clef) {
            Ok(_) => Ok(()),
            Err(ScoreError::TrackOccupied { .. }) => {
                self.logger.info(location, "clef_duplicate", format!("Clef already present at {}", tick));
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Tuplet for map entry `index`, creating it and its ancestors when needed.
///
/// `None` when the entry is invalid or its base duration has no destination
/// equivalent.
pub(crate) fn ensure_tuplet(
    score: &mut Score,
    map: &mut TupletMap<'_>,
    index: usize,
    measure: MeasureKey,
    track: TrackIndex,
    location: SourceLocation,
    logger: &mut ImportLogger,
) -> Result<Option<TupletKey>, EntryError> {
    let Some(entry) = map.get(index) else {
        return Ok(None);
    };
    if let Some(existing) = entry.created_tuplet {
        return Ok(Some(existing));
    }
    let (Some(descriptor), true) = (entry.descriptor, entry.valid) else {
        return Ok(None);
    };
    let (abs_begin, abs_duration, ratio) = (entry.abs_begin, entry.abs_duration, entry.ratio);

    let parent_index = map.index_of_parent(index);
    let parent = if parent_index == 0 {
        None
    } else {
        ensure_tuplet(score, map, parent_index, measure, track, location, logger)?
    };

    let Some(base_len) = convert::duration_from_edu(descriptor.base_duration) else {
        logger.warn(
            location,
            "tuplet_base_unsupported",
            format!("Tuplet base duration of {} EDU not supported", descriptor.base_duration),
        );
        return Ok(None);
    };
    let measure_tick = score
        .measure(measure)
        .map(|m| m.tick)
        .ok_or(ScoreError::StaleHandle("measure"))?;
    let mut tuplet = Score::create_tuplet(measure, track, measure_tick.checked_add(abs_begin)?, ratio, base_len)?;

    let covered = tuplet.ticks.checked_div(map.ancestor_ratio(index))?;
    if covered != abs_duration {
        logger.warn(
            location,
            "tuplet_corrupt",
            format!("Tuplet at {} spans {} but its base length gives {}", abs_begin, abs_duration, covered),
        );
    }

    transfer_display(&mut tuplet, &descriptor.display, location, logger);
    tuplet.parent = parent;
    let key = score.add_tuplet(tuplet)?;
    map.set_created(index, key);
    Ok(Some(key))
}

fn transfer_display(
    tuplet: &mut crate::score::Tuplet,
    display: &TupletDisplay,
    location: SourceLocation,
    logger: &mut ImportLogger,
) {
    tuplet.visible = !display.hidden;
    tuplet.number_type = convert::tuplet_number_type(display.number_style);
    tuplet.bracket_type = convert::tuplet_bracket_type(display.bracket_style);
    tuplet.autoplace = display.smart_tuplet;
    tuplet.offset = convert::evpu_point(
        display.tup_off_x + display.brack_off_x,
        display.tup_off_y + display.brack_off_y,
    );
    tuplet.user_p1 = convert::evpu_point(-display.left_hook_ext, 0);
    tuplet.user_p2 = convert::evpu_point(display.right_hook_ext, 0);
    if display.always_flat {
        tuplet.user_p2.1 = tuplet.user_p1.1;
    }

    for (set, option) in [
        (display.avoid_staff, "avoid staff"),
        (display.metric_center, "metric centering"),
        (display.full_dura, "full duration bracket"),
    ] {
        if set {
            logger.info(
                location,
                "tuplet_option_unsupported",
                format!("Tuplet option '{}' not supported", option),
            );
        }
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
