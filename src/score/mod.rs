//! Linear destination score
//!
//! Measures are laid end to end on an absolute tick axis (fractions of a
//! whole note). Each measure holds segments, one per (tick, segment type),
//! and every segment holds at most one element per track:
//!
//! ```text
//! Score
//!  ├── parts ── staves            (track = staff × VOICES + voice)
//!  └── measures (tick, ticks, time signature)
//!       └── segments (tick, type)
//!            └── track → chord/rest | clef | time signature
//! ```
//!
//! Tuplets, spanners, ties and beams refer to the elements they group.
//! Every mutation is journaled so an import can be rolled back.

pub mod layout;
pub mod types;
pub mod undo;

pub use layout::{LayoutEngine, SystemLayout};
pub use types::*;

use crate::errors::ScoreError;
use crate::fraction::Fraction;
use serde::Serialize;
use slotmap::SlotMap;
use undo::{Command, UndoStack};

/// Element handed to [`Score::add_element`]
#[derive(Clone, Debug)]
pub enum Element {
    ChordRest(ChordRest, Vec<Note>),
    Clef(Clef),
    TimeSig(TimeSig),
    Tuplet(Tuplet),
    Spanner(Spanner),
}

#[derive(Debug, Default, Serialize)]
pub struct Score {
    measures: SlotMap<MeasureKey, Measure>,
    measure_order: Vec<MeasureKey>,
    segments: SlotMap<SegmentKey, Segment>,
    chord_rests: SlotMap<ChordRestKey, ChordRest>,
    notes: SlotMap<NoteKey, Note>,
    tuplets: SlotMap<TupletKey, Tuplet>,
    clefs: SlotMap<ClefKey, Clef>,
    time_sigs: SlotMap<TimeSigKey, TimeSig>,
    spanners: SlotMap<SpannerKey, Spanner>,
    ties: SlotMap<TieKey, Tie>,
    beams: SlotMap<BeamKey, Beam>,
    tremolos: SlotMap<TremoloKey, Tremolo>,
    parts: Vec<Part>,
    staves: Vec<Staff>,
    #[serde(skip)]
    journal: UndoStack,
}

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // PARTS AND STAVES
    // ========================================================================

    pub fn append_part(&mut self, part: Part) -> usize {
        self.parts.push(part);
        let index = self.parts.len() - 1;
        self.journal.push(Command::AppendPart(index));
        index
    }

    pub fn append_staff(&mut self, staff: Staff) -> Result<StaffIndex, ScoreError> {
        let index = self.staves.len();
        let part = self
            .parts
            .get_mut(staff.part)
            .ok_or(ScoreError::StaleHandle("part"))?;
        part.staves.push(index);
        self.staves.push(staff);
        self.journal.push(Command::AppendStaff(index));
        Ok(index)
    }

    pub(crate) fn remove_part(&mut self, index: usize) -> Result<(), ScoreError> {
        if index + 1 != self.parts.len() {
            return Err(ScoreError::StaleHandle("part"));
        }
        self.parts.pop();
        Ok(())
    }

    pub(crate) fn remove_staff(&mut self, index: usize) -> Result<(), ScoreError> {
        if index + 1 != self.staves.len() {
            return Err(ScoreError::StaleHandle("staff"));
        }
        if let Some(staff) = self.staves.pop() {
            if let Some(part) = self.parts.get_mut(staff.part) {
                part.staves.retain(|s| *s != index);
            }
        }
        Ok(())
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn staves(&self) -> &[Staff] {
        &self.staves
    }

    pub fn staff(&self, index: StaffIndex) -> Option<&Staff> {
        self.staves.get(index)
    }

    pub fn staff_mut(&mut self, index: StaffIndex) -> Option<&mut Staff> {
        self.staves.get_mut(index)
    }

    pub fn nstaves(&self) -> usize {
        self.staves.len()
    }

    pub fn ntracks(&self) -> usize {
        self.staves.len() * VOICES
    }

    // ========================================================================
    // MEASURES AND SEGMENTS
    // ========================================================================

    /// Append a measure; `tick` must continue the previous measure
    pub fn create_measure(&mut self, tick: Fraction, time_sig: TimeSignature) -> Result<MeasureKey, ScoreError> {
        let expected = self.end_tick();
        if tick != expected {
            return Err(ScoreError::MeasureNotContiguous {
                expected,
                found: tick,
            });
        }
        let ticks = time_sig.duration().map_err(|_| ScoreError::InvalidParent)?;
        let key = self.measures.insert(Measure {
            number: self.measure_order.len() + 1,
            tick,
            ticks,
            time_sig,
            segments: Vec::new(),
            tuplets: Vec::new(),
        });
        self.measure_order.push(key);
        self.journal.push(Command::Add(ElementRef::Measure(key)));
        Ok(key)
    }

    pub fn measure(&self, key: MeasureKey) -> Option<&Measure> {
        self.measures.get(key)
    }

    pub fn measure_keys(&self) -> &[MeasureKey] {
        &self.measure_order
    }

    /// Measures in score order
    pub fn measures(&self) -> impl Iterator<Item = (MeasureKey, &Measure)> + '_ {
        self.measure_order
            .iter()
            .filter_map(move |k| self.measures.get(*k).map(|m| (*k, m)))
    }

    pub fn measure_index(&self, key: MeasureKey) -> Option<usize> {
        self.measure_order.iter().position(|k| *k == key)
    }

    pub fn first_measure(&self) -> Option<MeasureKey> {
        self.measure_order.first().copied()
    }

    pub fn last_measure(&self) -> Option<MeasureKey> {
        self.measure_order.last().copied()
    }

    pub fn next_measure(&self, key: MeasureKey) -> Option<MeasureKey> {
        let index = self.measure_index(key)?;
        self.measure_order.get(index + 1).copied()
    }

    /// Tick just past the last measure
    pub fn end_tick(&self) -> Fraction {
        self.last_measure()
            .and_then(|k| self.measures.get(k))
            .map_or(Fraction::ZERO, Measure::end_tick)
    }

    /// Measure containing `tick`
    pub fn tick2measure(&self, tick: Fraction) -> Option<MeasureKey> {
        let index = self
            .measure_order
            .partition_point(|k| self.measures.get(*k).map_or(false, |m| m.tick <= tick));
        let key = *self.measure_order.get(index.checked_sub(1)?)?;
        self.measures
            .get(key)
            .filter(|m| m.contains(tick))
            .map(|_| key)
    }

    pub fn segment(&self, key: SegmentKey) -> Option<&Segment> {
        self.segments.get(key)
    }

    pub fn find_segment(&self, measure: MeasureKey, kind: SegmentType, tick: Fraction) -> Option<SegmentKey> {
        let m = self.measures.get(measure)?;
        m.segments.iter().copied().find(|k| {
            self.segments
                .get(*k)
                .map_or(false, |s| s.tick == tick && s.kind == kind)
        })
    }

    /// Segments of any type at `tick`
    pub fn segments_at(&self, measure: MeasureKey, tick: Fraction) -> Vec<SegmentKey> {
        self.measures.get(measure).map_or_else(Vec::new, |m| {
            m.segments
                .iter()
                .copied()
                .filter(|k| self.segments.get(*k).map_or(false, |s| s.tick == tick))
                .collect()
        })
    }

    /// Existing segment of `kind` at `tick`, or a new one
    pub fn segment_at(&mut self, measure: MeasureKey, kind: SegmentType, tick: Fraction) -> Result<SegmentKey, ScoreError> {
        let m = self
            .measures
            .get(measure)
            .ok_or(ScoreError::StaleHandle("measure"))?;
        if !m.contains(tick) {
            return Err(ScoreError::TickOutsideMeasure { tick });
        }
        if let Some(existing) = self.find_segment(measure, kind, tick) {
            return Ok(existing);
        }

        let key = self.segments.insert(Segment {
            measure,
            tick,
            kind,
            elements: Vec::new(),
        });
        let segments = &self.segments;
        if let Some(m) = self.measures.get_mut(measure) {
            let position = m.segments.partition_point(|k| {
                segments.get(*k).map_or(false, |s| (s.tick, s.kind) < (tick, kind))
            });
            m.segments.insert(position, key);
        }
        self.journal.push(Command::Add(ElementRef::Segment(key)));
        Ok(key)
    }

    // ========================================================================
    // CHORDS AND RESTS
    // ========================================================================

    pub fn create_chord(duration: Duration) -> ChordRest {
        Self::create_chord_rest(duration, ChordRestKind::Chord(Chord::default()))
    }

    pub fn create_rest(duration: Duration) -> ChordRest {
        Self::create_chord_rest(duration, ChordRestKind::Rest(Rest::default()))
    }

    fn create_chord_rest(duration: Duration, kind: ChordRestKind) -> ChordRest {
        ChordRest {
            segment: SegmentKey::default(),
            track: 0,
            duration,
            ticks: duration.fraction().unwrap_or(Fraction::ZERO),
            tuplet: None,
            beam: None,
            beam_mode: BeamMode::Auto,
            visible: true,
            kind,
        }
    }

    /// Insert a chord or rest into a ChordRest segment on `track`
    pub fn add_chord_rest(
        &mut self,
        segment: SegmentKey,
        track: TrackIndex,
        mut chord_rest: ChordRest,
        notes: Vec<Note>,
    ) -> Result<ChordRestKey, ScoreError> {
        if track >= self.ntracks() {
            return Err(ScoreError::NoSuchStaff(track2staff(track)));
        }
        let seg = self
            .segments
            .get(segment)
            .ok_or(ScoreError::StaleHandle("segment"))?;
        if seg.kind != SegmentType::ChordRest {
            return Err(ScoreError::InvalidParent);
        }
        if seg.element(track).is_some() {
            return Err(ScoreError::TrackOccupied {
                track,
                tick: seg.tick,
            });
        }

        chord_rest.segment = segment;
        chord_rest.track = track;
        if let ChordRestKind::Chord(chord) = &mut chord_rest.kind {
            chord.notes.clear();
        }
        let key = self.chord_rests.insert(chord_rest);
        let mut note_keys = Vec::with_capacity(notes.len());
        for mut note in notes {
            note.chord = key;
            note_keys.push(self.notes.insert(note));
        }
        if let Some(ChordRestKind::Chord(chord)) = self.chord_rests.get_mut(key).map(|cr| &mut cr.kind) {
            chord.notes = note_keys;
        }
        if let Some(seg) = self.segments.get_mut(segment) {
            seg.elements.push((track, ElementRef::ChordRest(key)));
        }
        self.journal.push(Command::Add(ElementRef::ChordRest(key)));
        Ok(key)
    }

    pub fn chord_rest(&self, key: ChordRestKey) -> Option<&ChordRest> {
        self.chord_rests.get(key)
    }

    pub fn chord_rest_mut(&mut self, key: ChordRestKey) -> Option<&mut ChordRest> {
        self.chord_rests.get_mut(key)
    }

    pub fn chord_rests(&self) -> impl Iterator<Item = (ChordRestKey, &ChordRest)> + '_ {
        self.chord_rests.iter()
    }

    pub fn note(&self, key: NoteKey) -> Option<&Note> {
        self.notes.get(key)
    }

    /// Chord or rest at `tick` on `track`
    pub fn chord_rest_at(&self, tick: Fraction, track: TrackIndex) -> Option<ChordRestKey> {
        let measure = self.tick2measure(tick)?;
        let segment = self.find_segment(measure, SegmentType::ChordRest, tick)?;
        match self.segments.get(segment)?.element(track)? {
            ElementRef::ChordRest(key) => Some(key),
            _ => None,
        }
    }

    /// Chords and rests of one track within a measure, in time order
    pub fn chord_rests_on_track(&self, measure: MeasureKey, track: TrackIndex) -> Vec<ChordRestKey> {
        let Some(m) = self.measures.get(measure) else {
            return Vec::new();
        };
        m.segments
            .iter()
            .filter_map(|k| self.segments.get(*k))
            .filter(|s| s.kind == SegmentType::ChordRest)
            .filter_map(|s| match s.element(track) {
                Some(ElementRef::ChordRest(key)) => Some(key),
                _ => None,
            })
            .collect()
    }

    /// Summed actual length of the chords and rests of one track in a measure
    pub fn track_ticks(&self, measure: MeasureKey, track: TrackIndex) -> Fraction {
        self.chord_rests_on_track(measure, track)
            .iter()
            .filter_map(|k| self.chord_rests.get(*k))
            .fold(Fraction::ZERO, |acc, cr| acc.checked_add(cr.ticks).unwrap_or(acc))
    }

    /// Absolute tick of an element that sits in a segment
    pub fn element_tick(&self, element: ElementRef) -> Option<Fraction> {
        match element {
            ElementRef::Segment(k) => self.segments.get(k).map(|s| s.tick),
            ElementRef::ChordRest(k) => {
                let cr = self.chord_rests.get(k)?;
                self.segments.get(cr.segment).map(|s| s.tick)
            }
            ElementRef::Note(k) => self.element_tick(ElementRef::ChordRest(self.notes.get(k)?.chord)),
            ElementRef::Measure(k) => self.measures.get(k).map(|m| m.tick),
            ElementRef::Clef(k) => self.clefs.get(k).and_then(|c| self.element_tick(ElementRef::Segment(c.segment))),
            ElementRef::TimeSig(k) => self
                .time_sigs
                .get(k)
                .and_then(|t| self.element_tick(ElementRef::Segment(t.segment))),
            ElementRef::Tuplet(k) => self.tuplets.get(k).map(|t| t.tick),
            ElementRef::Spanner(k) => self.spanners.get(k).map(|s| s.tick),
            ElementRef::Tremolo(k) => self.element_tick(ElementRef::ChordRest(self.tremolos.get(k)?.chord1)),
            ElementRef::Tie(_) | ElementRef::Beam(_) => None,
        }
    }

    pub fn element_track(&self, element: ElementRef) -> Option<TrackIndex> {
        match element {
            ElementRef::ChordRest(k) => self.chord_rests.get(k).map(|cr| cr.track),
            ElementRef::Note(k) => self.element_track(ElementRef::ChordRest(self.notes.get(k)?.chord)),
            ElementRef::Clef(k) => self.clefs.get(k).map(|c| c.track),
            ElementRef::TimeSig(k) => self.time_sigs.get(k).map(|t| t.track),
            ElementRef::Tuplet(k) => self.tuplets.get(k).map(|t| t.track),
            ElementRef::Spanner(k) => self.spanners.get(k).map(|s| s.track),
            ElementRef::Beam(k) => self.beams.get(k).map(|b| b.track),
            ElementRef::Tremolo(k) => self.tremolos.get(k).map(|t| t.track),
            _ => None,
        }
    }

    // ========================================================================
    // TUPLETS
    // ========================================================================

    /// Unattached tuplet whose local length is base length × ratio denominator
    pub fn create_tuplet(
        measure: MeasureKey,
        track: TrackIndex,
        tick: Fraction,
        ratio: Fraction,
        base_len: Duration,
    ) -> Result<Tuplet, ScoreError> {
        let mut tuplet = Tuplet::new(measure, track, tick, ratio, base_len);
        tuplet.ticks = base_len
            .fraction()
            .and_then(|f| f.checked_mul_int(ratio.denominator()))
            .map_err(|_| ScoreError::InvalidParent)?;
        Ok(tuplet)
    }

    pub fn add_tuplet(&mut self, tuplet: Tuplet) -> Result<TupletKey, ScoreError> {
        let measure = tuplet.measure;
        let parent = tuplet.parent;
        if !self.measures.contains_key(measure) {
            return Err(ScoreError::StaleHandle("measure"));
        }
        if let Some(p) = parent {
            if !self.tuplets.contains_key(p) {
                return Err(ScoreError::StaleHandle("tuplet"));
            }
        }
        let key = self.tuplets.insert(tuplet);
        if let Some(m) = self.measures.get_mut(measure) {
            m.tuplets.push(key);
        }
        if let Some(p) = parent.and_then(|p| self.tuplets.get_mut(p)) {
            p.elements.push(TupletMember::Tuplet(key));
        }
        self.journal.push(Command::Add(ElementRef::Tuplet(key)));
        Ok(key)
    }

    pub fn tuplet(&self, key: TupletKey) -> Option<&Tuplet> {
        self.tuplets.get(key)
    }

    pub fn tuplet_mut(&mut self, key: TupletKey) -> Option<&mut Tuplet> {
        self.tuplets.get_mut(key)
    }

    pub fn tuplets(&self) -> impl Iterator<Item = (TupletKey, &Tuplet)> + '_ {
        self.tuplets.iter()
    }

    /// Move `child` under `parent`
    pub fn set_tuplet_parent(&mut self, child: TupletKey, parent: TupletKey) -> Result<(), ScoreError> {
        if child == parent || !self.tuplets.contains_key(parent) {
            return Err(ScoreError::InvalidParent);
        }
        let previous = self
            .tuplets
            .get_mut(child)
            .ok_or(ScoreError::StaleHandle("tuplet"))?
            .parent
            .replace(parent);
        if let Some(old) = previous.and_then(|p| self.tuplets.get_mut(p)) {
            old.elements.retain(|e| *e != TupletMember::Tuplet(child));
        }
        if let Some(p) = self.tuplets.get_mut(parent) {
            p.elements.push(TupletMember::Tuplet(child));
        }
        Ok(())
    }

    pub fn add_to_tuplet(&mut self, tuplet: TupletKey, chord_rest: ChordRestKey) -> Result<(), ScoreError> {
        let t = self
            .tuplets
            .get_mut(tuplet)
            .ok_or(ScoreError::StaleHandle("tuplet"))?;
        let cr = self
            .chord_rests
            .get_mut(chord_rest)
            .ok_or(ScoreError::StaleHandle("chord/rest"))?;
        cr.tuplet = Some(tuplet);
        t.elements.push(TupletMember::ChordRest(chord_rest));
        Ok(())
    }

    // ========================================================================
    // CLEFS AND TIME SIGNATURES
    // ========================================================================

    pub fn add_clef(&mut self, segment: SegmentKey, mut clef: Clef) -> Result<ClefKey, ScoreError> {
        let seg = self
            .segments
            .get(segment)
            .ok_or(ScoreError::StaleHandle("segment"))?;
        if !matches!(seg.kind, SegmentType::HeaderClef | SegmentType::Clef) {
            return Err(ScoreError::InvalidParent);
        }
        if seg.element(clef.track).is_some() {
            return Err(ScoreError::TrackOccupied {
                track: clef.track,
                tick: seg.tick,
            });
        }
        clef.segment = segment;
        let track = clef.track;
        let key = self.clefs.insert(clef);
        if let Some(seg) = self.segments.get_mut(segment) {
            seg.elements.push((track, ElementRef::Clef(key)));
        }
        self.journal.push(Command::Add(ElementRef::Clef(key)));
        Ok(key)
    }

    pub fn clef(&self, key: ClefKey) -> Option<&Clef> {
        self.clefs.get(key)
    }

    pub fn clefs(&self) -> impl Iterator<Item = (ClefKey, &Clef)> + '_ {
        self.clefs.iter()
    }

    pub fn add_time_sig(&mut self, segment: SegmentKey, mut time_sig: TimeSig) -> Result<TimeSigKey, ScoreError> {
        let seg = self
            .segments
            .get(segment)
            .ok_or(ScoreError::StaleHandle("segment"))?;
        if seg.kind != SegmentType::TimeSig {
            return Err(ScoreError::InvalidParent);
        }
        if seg.element(time_sig.track).is_some() {
            return Err(ScoreError::TrackOccupied {
                track: time_sig.track,
                tick: seg.tick,
            });
        }
        time_sig.segment = segment;
        let track = time_sig.track;
        let key = self.time_sigs.insert(time_sig);
        if let Some(seg) = self.segments.get_mut(segment) {
            seg.elements.push((track, ElementRef::TimeSig(key)));
        }
        self.journal.push(Command::Add(ElementRef::TimeSig(key)));
        Ok(key)
    }

    pub fn time_sig(&self, key: TimeSigKey) -> Option<&TimeSig> {
        self.time_sigs.get(key)
    }

    pub fn time_sigs(&self) -> impl Iterator<Item = (TimeSigKey, &TimeSig)> + '_ {
        self.time_sigs.iter()
    }

    // ========================================================================
    // SPANNERS, TIES, BEAMS
    // ========================================================================

    pub fn create_spanner(kind: SpannerKind) -> Spanner {
        Spanner {
            kind,
            anchor: AnchorMode::Segment,
            tick: Fraction::ZERO,
            tick2: Fraction::ZERO,
            track: 0,
            track2: 0,
            start_element: None,
            end_element: None,
            visible: true,
            properties: SpannerProperties::default(),
            segments: Vec::new(),
        }
    }

    pub fn add_spanner(&mut self, spanner: Spanner) -> SpannerKey {
        let key = self.spanners.insert(spanner);
        self.journal.push(Command::Add(ElementRef::Spanner(key)));
        key
    }

    pub fn spanner(&self, key: SpannerKey) -> Option<&Spanner> {
        self.spanners.get(key)
    }

    pub fn spanner_mut(&mut self, key: SpannerKey) -> Option<&mut Spanner> {
        self.spanners.get_mut(key)
    }

    pub fn spanners(&self) -> impl Iterator<Item = (SpannerKey, &Spanner)> + '_ {
        self.spanners.iter()
    }

    pub fn add_tie(&mut self, start_note: NoteKey, end_note: Option<NoteKey>, kind: TieKind) -> Result<TieKey, ScoreError> {
        if !self.notes.contains_key(start_note) || end_note.map_or(false, |n| !self.notes.contains_key(n)) {
            return Err(ScoreError::StaleHandle("note"));
        }
        let key = self.ties.insert(Tie {
            start_note,
            end_note,
            kind,
        });
        if let Some(note) = self.notes.get_mut(start_note) {
            note.tie_forward = Some(key);
        }
        if let Some(note) = end_note.and_then(|n| self.notes.get_mut(n)) {
            note.tie_back = Some(key);
        }
        self.journal.push(Command::Add(ElementRef::Tie(key)));
        Ok(key)
    }

    pub fn tie(&self, key: TieKey) -> Option<&Tie> {
        self.ties.get(key)
    }

    pub fn ties(&self) -> impl Iterator<Item = (TieKey, &Tie)> + '_ {
        self.ties.iter()
    }

    pub fn add_beam(&mut self, track: TrackIndex, elements: Vec<ChordRestKey>) -> Result<BeamKey, ScoreError> {
        if elements.iter().any(|k| !self.chord_rests.contains_key(*k)) {
            return Err(ScoreError::StaleHandle("chord/rest"));
        }
        let members = elements.clone();
        let key = self.beams.insert(Beam { track, elements });
        for member in members {
            if let Some(cr) = self.chord_rests.get_mut(member) {
                cr.beam = Some(key);
            }
        }
        self.journal.push(Command::Add(ElementRef::Beam(key)));
        Ok(key)
    }

    pub fn beam(&self, key: BeamKey) -> Option<&Beam> {
        self.beams.get(key)
    }

    pub fn beams(&self) -> impl Iterator<Item = (BeamKey, &Beam)> + '_ {
        self.beams.iter()
    }

    /// Tremolo alternating between two chords of the same track
    pub fn add_tremolo(
        &mut self,
        kind: TremoloType,
        chord1: ChordRestKey,
        chord2: ChordRestKey,
    ) -> Result<TremoloKey, ScoreError> {
        let (Some(first), Some(second)) = (self.chord_rests.get(chord1), self.chord_rests.get(chord2)) else {
            return Err(ScoreError::StaleHandle("chord/rest"));
        };
        if first.is_rest() || second.is_rest() || first.track != second.track {
            return Err(ScoreError::InvalidParent);
        }
        let track = first.track;
        let key = self.tremolos.insert(Tremolo {
            kind,
            track,
            chord1,
            chord2,
        });
        self.journal.push(Command::Add(ElementRef::Tremolo(key)));
        Ok(key)
    }

    pub fn tremolo(&self, key: TremoloKey) -> Option<&Tremolo> {
        self.tremolos.get(key)
    }

    pub fn tremolos(&self) -> impl Iterator<Item = (TremoloKey, &Tremolo)> + '_ {
        self.tremolos.iter()
    }

    /// Attach `element` to `parent` and journal the addition
    pub fn add_element(&mut self, parent: ElementRef, element: Element) -> Result<ElementRef, ScoreError> {
        match (parent, element) {
            (ElementRef::Segment(segment), Element::ChordRest(cr, notes)) => {
                let track = cr.track;
                self.add_chord_rest(segment, track, cr, notes).map(ElementRef::ChordRest)
            }
            (ElementRef::Segment(segment), Element::Clef(clef)) => self.add_clef(segment, clef).map(ElementRef::Clef),
            (ElementRef::Segment(segment), Element::TimeSig(sig)) => {
                self.add_time_sig(segment, sig).map(ElementRef::TimeSig)
            }
            (ElementRef::Measure(measure), Element::Tuplet(mut tuplet)) => {
                tuplet.measure = measure;
                self.add_tuplet(tuplet).map(ElementRef::Tuplet)
            }
            (ElementRef::Tuplet(parent), Element::Tuplet(mut tuplet)) => {
                tuplet.parent = Some(parent);
                self.add_tuplet(tuplet).map(ElementRef::Tuplet)
            }
            (ElementRef::Measure(_), Element::Spanner(spanner)) => Ok(ElementRef::Spanner(self.add_spanner(spanner))),
            _ => Err(ScoreError::InvalidParent),
        }
    }

    // ========================================================================
    // UNDO
    // ========================================================================

    /// Group subsequent mutations into one undo step
    pub fn begin_batch(&mut self) {
        self.journal.begin_batch();
    }

    pub fn end_batch(&mut self) {
        self.journal.finalize_batch();
    }

    pub fn can_undo(&self) -> bool {
        self.journal.can_undo()
    }

    /// Revert the last undo step; `Ok(false)` when there is nothing to undo
    pub fn undo_last_batch(&mut self) -> Result<bool, ScoreError> {
        match self.journal.pop() {
            Some(command) => {
                command.undo(self)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn remove_element(&mut self, element: ElementRef) -> Result<(), ScoreError> {
        match element {
            ElementRef::Measure(k) => {
                self.measures.remove(k).ok_or(ScoreError::StaleHandle("measure"))?;
                self.measure_order.retain(|m| *m != k);
            }
            ElementRef::Segment(k) => {
                let seg = self.segments.remove(k).ok_or(ScoreError::StaleHandle("segment"))?;
                if let Some(m) = self.measures.get_mut(seg.measure) {
                    m.segments.retain(|s| *s != k);
                }
            }
            ElementRef::ChordRest(k) => {
                let cr = self
                    .chord_rests
                    .remove(k)
                    .ok_or(ScoreError::StaleHandle("chord/rest"))?;
                for note in cr.notes() {
                    self.notes.remove(*note);
                }
                if let Some(seg) = self.segments.get_mut(cr.segment) {
                    seg.elements.retain(|(_, e)| *e != element);
                }
                if let Some(t) = cr.tuplet.and_then(|t| self.tuplets.get_mut(t)) {
                    t.elements.retain(|e| *e != TupletMember::ChordRest(k));
                }
                if let Some(b) = cr.beam.and_then(|b| self.beams.get_mut(b)) {
                    b.elements.retain(|e| *e != k);
                }
            }
            ElementRef::Note(k) => {
                let note = self.notes.remove(k).ok_or(ScoreError::StaleHandle("note"))?;
                if let Some(ChordRestKind::Chord(chord)) = self.chord_rests.get_mut(note.chord).map(|cr| &mut cr.kind) {
                    chord.notes.retain(|n| *n != k);
                }
            }
            ElementRef::Tuplet(k) => {
                let tuplet = self.tuplets.remove(k).ok_or(ScoreError::StaleHandle("tuplet"))?;
                if let Some(p) = tuplet.parent.and_then(|p| self.tuplets.get_mut(p)) {
                    p.elements.retain(|e| *e != TupletMember::Tuplet(k));
                }
                if let Some(m) = self.measures.get_mut(tuplet.measure) {
                    m.tuplets.retain(|t| *t != k);
                }
            }
            ElementRef::Clef(k) => {
                let clef = self.clefs.remove(k).ok_or(ScoreError::StaleHandle("clef"))?;
                if let Some(seg) = self.segments.get_mut(clef.segment) {
                    seg.elements.retain(|(_, e)| *e != element);
                }
            }
            ElementRef::TimeSig(k) => {
                let sig = self.time_sigs.remove(k).ok_or(ScoreError::StaleHandle("time signature"))?;
                if let Some(seg) = self.segments.get_mut(sig.segment) {
                    seg.elements.retain(|(_, e)| *e != element);
                }
            }
            ElementRef::Spanner(k) => {
                self.spanners.remove(k).ok_or(ScoreError::StaleHandle("spanner"))?;
            }
            ElementRef::Tie(k) => {
                let tie = self.ties.remove(k).ok_or(ScoreError::StaleHandle("tie"))?;
                if let Some(note) = self.notes.get_mut(tie.start_note) {
                    note.tie_forward = None;
                }
                if let Some(note) = tie.end_note.and_then(|n| self.notes.get_mut(n)) {
                    note.tie_back = None;
                }
            }
            ElementRef::Tremolo(k) => {
                self.tremolos.remove(k).ok_or(ScoreError::StaleHandle("tremolo"))?;
            }
            ElementRef::Beam(k) => {
                let beam = self.beams.remove(k).ok_or(ScoreError::StaleHandle("beam"))?;
                for member in beam.elements {
                    if let Some(cr) = self.chord_rests.get_mut(member) {
                        cr.beam = None;
                    }
                }
            }
        }
        Ok(())
    }
}
