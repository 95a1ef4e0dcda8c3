//! One source entry → one chord or rest
//!
//! Also holds the per-part state that follows entries around: the layer to
//! voice assignment and pending ties. Beams and two-chord tremolos are built
//! once a voice has been placed.

use super::convert;
use super::tuplet_map::TremoloSpan;
use crate::diagnostics::{ImportLogger, SourceLocation};
use crate::errors::ScoreError;
use crate::fraction::Fraction;
use crate::score::{
    Accidental, AccidentalRole, BeamMode, Chord, ChordRest, ChordRestKey, ChordRestKind, Direction, MeasureKey, Note,
    NoteKey, Rest, Score, SegmentKey, StaffIndex, TieKind, TremoloType, TrackIndex, TupletKey, VOICES,
};
use crate::source::{EntryNumber, LayerAttributes, LayerIndex, NoteId, SourceEntry, StaffId, MAX_LAYERS};
use std::collections::{BTreeMap, HashMap};

/// Note id carried by the positioning note of a non-floating rest
pub const REST_NOTE_ID: NoteId = 0;

// ============================================================================
// LAYER → VOICE
// ============================================================================

/// Voice assigned to each source layer, and which layers force stem directions.
///
/// Voices 0 and 2 have stems up, voices 1 and 3 stems down.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayerMap {
    voices: [Option<usize>; MAX_LAYERS],
    forced_stems: [bool; MAX_LAYERS],
}

impl LayerMap {
    /// Frozen layers claim voices first, in the order of their attributes.
    /// Layers without attributes take the first free voice and keep automatic stems.
    pub fn build(attributes: &[LayerAttributes], logger: &mut ImportLogger) -> Self {
        let mut map = LayerMap::default();
        let frozen = attributes.iter().filter(|a| a.freeze_layer);
        let unfrozen = attributes.iter().filter(|a| !a.freeze_layer);
        for attrs in frozen.chain(unfrozen) {
            map.map_layer(attrs, logger);
        }
        for layer in 0..MAX_LAYERS {
            if map.voices[layer].is_some() || attributes.iter().any(|a| usize::from(a.layer) == layer) {
                continue;
            }
            if let Some(voice) = (0..VOICES).find(|v| !map.voices.contains(&Some(*v))) {
                map.voices[layer] = Some(voice);
            }
        }
        map
    }

    fn map_layer(&mut self, attrs: &LayerAttributes, logger: &mut ImportLogger) {
        let layer = usize::from(attrs.layer);
        if layer >= MAX_LAYERS || self.voices[layer].is_some() {
            return;
        }
        let try_order: [usize; 4] = match (attrs.freeze_layer, attrs.freeze_stems_up) {
            (false, _) => [0, 1, 2, 3],
            (true, true) => [0, 2, 1, 3],
            (true, false) => [1, 3, 0, 2],
        };
        match try_order.into_iter().find(|v| !self.voices.contains(&Some(*v))) {
            Some(voice) => {
                self.voices[layer] = Some(voice);
                let stem_up_voice = voice % 2 == 0;
                self.forced_stems[layer] = !attrs.freeze_layer || attrs.freeze_stems_up != stem_up_voice;
            }
            None => logger.warn(
                SourceLocation::default(),
                "layer_unmapped",
                format!("Unable to map layer {} to a voice", layer + 1),
            ),
        }
    }

    pub fn voice(&self, layer: LayerIndex) -> Option<usize> {
        self.voices.get(usize::from(layer)).copied().flatten()
    }

    pub fn forces_stems(&self, layer: LayerIndex) -> bool {
        self.forced_stems.get(usize::from(layer)).copied().unwrap_or(false)
    }
}

// ============================================================================
// ENTRY IMPORT
// ============================================================================

/// Where an entry is going
#[derive(Clone, Copy, Debug)]
pub struct EntryTarget {
    pub staff: StaffIndex,
    pub track: TrackIndex,
    pub layer: LayerIndex,
    pub location: SourceLocation,
}

/// Converted entry, ready to be inserted
#[derive(Clone, Debug)]
pub struct PreparedEntry {
    pub number: EntryNumber,
    pub chord_rest: ChordRest,
    pub notes: Vec<Note>,
    /// (tie start, tie end) per note
    pub ties: Vec<(bool, bool)>,
}

/// Converts entries and tracks the ties between them
#[derive(Debug)]
pub struct EntryImporter<'a> {
    staff_ids: &'a HashMap<StaffId, StaffIndex>,
    layers: &'a LayerMap,
    ties: TieTracker,
    import_ties: bool,
}

impl<'a> EntryImporter<'a> {
    pub fn new(staff_ids: &'a HashMap<StaffId, StaffIndex>, layers: &'a LayerMap, import_ties: bool) -> Self {
        Self {
            staff_ids,
            layers,
            ties: TieTracker::default(),
            import_ties,
        }
    }

    pub fn layers(&self) -> &LayerMap {
        self.layers
    }

    /// Chord or rest for `entry`; `None` when its duration has no destination equivalent
    pub fn import_entry(
        &self,
        score: &Score,
        entry: &SourceEntry,
        target: EntryTarget,
        logger: &mut ImportLogger,
    ) -> Option<PreparedEntry> {
        let Some(duration) = convert::duration_from_edu(entry.duration) else {
            logger.warn(
                target.location,
                "unsupported_duration",
                format!("Entry {}: duration of {} EDU not supported", entry.number, entry.duration),
            );
            return None;
        };
        let nominal = duration.fraction().ok()?;

        let (kind, notes, ties) = if entry.is_note && !entry.notes.is_empty() {
            let staff_move = self.cross_staff_move(score, entry, target.staff);
            let mut notes = Vec::with_capacity(entry.notes.len());
            let mut ties = Vec::with_capacity(entry.notes.len());
            for source in &entry.notes {
                let spelling = convert::spell_pitch(source.harm_lev, source.harm_alt);
                if !spelling.exact {
                    logger.info(
                        target.location,
                        "pitch_respelled",
                        format!("Entry {}: note {} respelled", entry.number, source.note_id),
                    );
                }
                let accidental = (source.freeze_acci || source.harm_alt != 0)
                    .then(|| convert::accidental_type(spelling.alter))
                    .flatten()
                    .map(|kind| Accidental {
                        kind,
                        role: if source.freeze_acci {
                            AccidentalRole::User
                        } else {
                            AccidentalRole::Auto
                        },
                    });
                notes.push(Note {
                    chord: ChordRestKey::default(),
                    pitch: spelling.pitch,
                    tpc: spelling.tpc,
                    accidental,
                    tie_forward: None,
                    tie_back: None,
                });
                ties.push((source.tie_start, source.tie_end));
            }

            let forced = entry.freeze_stem || entry.voice2 || entry.v2_launch || self.layers.forces_stems(target.layer);
            let stem_direction = match (forced, entry.up_stem) {
                (false, _) => Direction::Auto,
                (true, true) => Direction::Up,
                (true, false) => Direction::Down,
            };
            let chord = Chord {
                notes: Vec::new(),
                stem_direction,
                staff_move,
            };
            (ChordRestKind::Chord(chord), notes, ties)
        } else {
            let mut rest = Rest::default();
            if !entry.float_rest {
                if let Some(first) = entry.notes.first() {
                    if first.note_id == REST_NOTE_ID {
                        rest.fixed_line = Some(first.harm_lev);
                    } else {
                        logger.warn(
                            target.location,
                            "rest_note_id",
                            format!("Entry {}: rest with unexpected note id {}", entry.number, first.note_id),
                        );
                    }
                }
            }
            (ChordRestKind::Rest(rest), Vec::new(), Vec::new())
        };

        let beam_mode = if nominal < Fraction::new(1, 4).ok()? {
            BeamMode::NoBeam
        } else {
            BeamMode::Auto
        };
        Some(PreparedEntry {
            number: entry.number,
            chord_rest: ChordRest {
                segment: SegmentKey::default(),
                track: target.track,
                duration,
                ticks: nominal,
                tuplet: None,
                beam: None,
                beam_mode,
                visible: true,
                kind,
            },
            notes,
            ties,
        })
    }

    /// Staff offset of a chord whose notes all sit on another staff.
    ///
    /// The outermost target wins; a target outside the part is ignored.
    fn cross_staff_move(&self, score: &Score, entry: &SourceEntry, staff: StaffIndex) -> i32 {
        if entry.notes.iter().any(|n| n.cross_staff.is_none()) {
            return 0;
        }
        let staff_move = entry
            .notes
            .iter()
            .filter_map(|n| n.cross_staff.and_then(|id| self.staff_ids.get(&id)))
            .map(|&target| target as i32 - staff as i32)
            .max_by_key(|m| m.abs())
            .unwrap_or(0);

        let target = staff as i32 + staff_move;
        let same_part = usize::try_from(target)
            .ok()
            .and_then(|t| score.staff(t))
            .zip(score.staff(staff))
            .map_or(false, |(t, s)| t.part == s.part);
        if same_part {
            staff_move
        } else {
            0
        }
    }

    /// Insert a prepared entry with its actual length and connect its ties
    pub fn place(
        &mut self,
        score: &mut Score,
        prepared: PreparedEntry,
        segment: SegmentKey,
        actual: Fraction,
        logger: &mut ImportLogger,
        location: SourceLocation,
    ) -> Result<ChordRestKey, ScoreError> {
        let PreparedEntry {
            mut chord_rest,
            notes,
            ties,
            ..
        } = prepared;
        chord_rest.ticks = actual;
        let track = chord_rest.track;
        let pitches: Vec<u8> = notes.iter().map(|n| n.pitch).collect();
        let key = score.add_chord_rest(segment, track, chord_rest, notes)?;

        if self.import_ties {
            let note_keys = score.chord_rest(key).map(|cr| cr.notes().to_vec()).unwrap_or_default();
            for ((note, pitch), (start, end)) in note_keys.into_iter().zip(pitches).zip(ties) {
                self.ties.note_placed(score, track, pitch, note, start, end, logger, location)?;
            }
        }
        Ok(key)
    }

    /// Turn ties still waiting for an end note into laissez-vibrer ties
    pub fn finish_part(&mut self, score: &mut Score) -> Result<usize, ScoreError> {
        self.ties.finish(score)
    }
}

// ============================================================================
// ENTRY INDEX
// ============================================================================

/// Placed chord or rest of every imported entry, and its notes by note id
#[derive(Debug, Default, Clone)]
pub struct EntryIndex {
    chord_rests: HashMap<EntryNumber, ChordRestKey>,
    notes: HashMap<(EntryNumber, NoteId), NoteKey>,
}

impl EntryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record where `entry` was placed; notes pair up with the source notes in order
    pub fn insert(&mut self, score: &Score, entry: &SourceEntry, key: ChordRestKey) {
        self.chord_rests.insert(entry.number, key);
        if let Some(cr) = score.chord_rest(key) {
            for (source, note) in entry.notes.iter().zip(cr.notes()) {
                self.notes.insert((entry.number, source.note_id), *note);
            }
        }
    }

    pub fn chord_rest(&self, entry: EntryNumber) -> Option<ChordRestKey> {
        self.chord_rests.get(&entry).copied()
    }

    pub fn note(&self, entry: EntryNumber, note_id: NoteId) -> Option<NoteKey> {
        self.notes.get(&(entry, note_id)).copied()
    }

    pub fn len(&self) -> usize {
        self.chord_rests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chord_rests.is_empty()
    }
}

// ============================================================================
// TIES
// ============================================================================

/// Tie starts waiting for the next note of the same pitch on the same track
#[derive(Debug, Default)]
pub struct TieTracker {
    pending: BTreeMap<(TrackIndex, u8), NoteKey>,
}

impl TieTracker {
    #[allow(clippy::too_many_arguments)]
    pub fn note_placed(
        &mut self,
        score: &mut Score,
        track: TrackIndex,
        pitch: u8,
        note: NoteKey,
        tie_start: bool,
        tie_end: bool,
        logger: &mut ImportLogger,
        location: SourceLocation,
    ) -> Result<(), ScoreError> {
        if tie_end {
            match self.pending.remove(&(track, pitch)) {
                Some(start) => {
                    score.add_tie(start, Some(note), TieKind::Tie)?;
                }
                None => logger.info(location, "partial_tie", "Tie does not have a starting note"),
            }
        }
        if tie_start {
            if let Some(unfinished) = self.pending.insert((track, pitch), note) {
                score.add_tie(unfinished, None, TieKind::LaissezVib)?;
            }
        }
        Ok(())
    }

    pub fn finish(&mut self, score: &mut Score) -> Result<usize, ScoreError> {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for start in pending.into_values() {
            score.add_tie(start, None, TieKind::LaissezVib)?;
        }
        Ok(count)
    }
}

// ============================================================================
// BEAMS
// ============================================================================

fn continuation_mode(entry: &SourceEntry) -> BeamMode {
    match entry.sec_beam_break {
        Some(1) => BeamMode::Begin16,
        Some(n) if n >= 2 => BeamMode::Begin32,
        _ => BeamMode::Mid,
    }
}

/// Group placed entries of one voice into beams.
///
/// A group opens at an entry flagged as beam start and runs through the
/// following entries shorter than a quarter. Returns the number of beams.
pub fn build_beams(
    score: &mut Score,
    track: TrackIndex,
    placed: &[(&SourceEntry, ChordRestKey)],
) -> Result<usize, ScoreError> {
    let quarter = convert::edu_to_fraction(1024).unwrap_or(Fraction::ZERO);
    let mut beams = 0;
    let mut group: Vec<(&SourceEntry, ChordRestKey)> = Vec::new();

    for &(entry, key) in placed {
        let beamable = convert::edu_to_fraction(entry.duration).map_or(false, |d| d < quarter);
        if !beamable {
            beams += flush_beam(score, track, &mut group)?;
            continue;
        }
        if entry.beam_start {
            beams += flush_beam(score, track, &mut group)?;
            group.push((entry, key));
        } else if !group.is_empty() {
            group.push((entry, key));
        }
    }
    beams += flush_beam(score, track, &mut group)?;
    Ok(beams)
}

fn flush_beam(
    score: &mut Score,
    track: TrackIndex,
    group: &mut Vec<(&SourceEntry, ChordRestKey)>,
) -> Result<usize, ScoreError> {
    let members = std::mem::take(group);
    if members.len() < 2 {
        return Ok(0);
    }
    let last = members.len() - 1;
    for (i, (entry, key)) in members.iter().enumerate() {
        let mode = match i {
            0 => BeamMode::Begin,
            i if i == last => BeamMode::End,
            _ => continuation_mode(entry),
        };
        if let Some(cr) = score.chord_rest_mut(*key) {
            cr.beam_mode = mode;
        }
    }
    score.add_beam(track, members.into_iter().map(|(_, key)| key).collect())?;
    Ok(1)
}

// ============================================================================
// TREMOLOS
// ============================================================================

/// Product of the ratios of `tuplet` and everything enclosing it
fn tuplet_chain_ratio(score: &Score, tuplet: Option<TupletKey>) -> Fraction {
    let mut ratio = Fraction::ONE;
    let mut current = tuplet;
    while let Some(t) = current.and_then(|k| score.tuplet(k)) {
        ratio = ratio.checked_mul(t.ratio).unwrap_or(ratio);
        current = t.parent;
    }
    ratio
}

/// Turn each tremolo span of a voice into a two-chord tremolo.
///
/// The first chord sits at the span start and the second halfway through.
/// Both are rewritten to the value filling their half of the span; the
/// value they were entered with gives the number of strokes.
pub fn build_tremolos(
    score: &mut Score,
    spans: &[TremoloSpan],
    measure: MeasureKey,
    track: TrackIndex,
    location: SourceLocation,
    logger: &mut ImportLogger,
) -> Result<usize, ScoreError> {
    let measure_tick = score
        .measure(measure)
        .map(|m| m.tick)
        .ok_or(ScoreError::StaleHandle("measure"))?;
    let mut created = 0;

    for span in spans {
        let ticks = Fraction::from_integer(2).ok().and_then(|two| {
            let first = measure_tick.checked_add(span.begin).ok()?;
            let middle = span.begin.checked_add(span.end).ok()?.checked_div(two).ok()?;
            Some((first, measure_tick.checked_add(middle).ok()?))
        });
        let pair = ticks.and_then(|(first, second)| {
            let c1 = score.chord_rest_at(first, track)?;
            let c2 = score.chord_rest_at(second, track)?;
            let (a, b) = (score.chord_rest(c1)?, score.chord_rest(c2)?);
            (!a.is_rest() && !b.is_rest() && a.ticks == b.ticks).then_some((c1, c2, second.checked_sub(first).ok()?))
        });
        let Some((c1, c2, spacing)) = pair else {
            logger.warn(
                location,
                "tremolo_unmatched",
                format!("No pair of equal chords for the tremolo at {}", span.begin),
            );
            continue;
        };

        let Some(first) = score.chord_rest(c1) else {
            continue;
        };
        let kind = TremoloType::from_beams(first.duration.kind.hooks());
        let nominal = spacing.checked_mul(tuplet_chain_ratio(score, first.tuplet)).ok();
        let duration = match nominal.map(convert::decompose_duration) {
            Some((parts, rest)) if parts.len() == 1 && rest.is_zero() => parts[0],
            _ => {
                logger.warn(
                    location,
                    "tremolo_duration",
                    format!("Tremolo at {}: {} has no single note value", span.begin, spacing),
                );
                continue;
            }
        };
        for key in [c1, c2] {
            if let Some(cr) = score.chord_rest_mut(key) {
                cr.duration = duration;
                cr.ticks = spacing;
            }
        }
        score.add_tremolo(kind, c1, c2)?;
        created += 1;
    }
    Ok(created)
}
