//! Smart shapes → spanners
//!
//! Each shape becomes one spanner. The kind comes from the declared shape
//! type, or for custom lines from the line's glyph and texts. Both ends are
//! resolved to a note, a chord or rest, or a time position on a staff, then
//! checked against what the kind can attach to. A shape that fails any step
//! is dropped on its own.
//!
//! Positioning runs later, once a layout engine has split the spanners into
//! system segments.

use super::convert;
use super::entries::EntryIndex;
use super::scoremap::ScoreMap;
use super::PartContext;
use crate::diagnostics::{ImportLogger, SourceLocation};
use crate::errors::SpannerError;
use crate::fraction::{Fraction, TICKS_PER_WHOLE};
use crate::score::{
    staff2track, track2staff, AnchorMode, ChordRestKey, ElementRef, HairpinType, LayoutEngine, LineStyle, MeasureKey,
    NoteKey, OttavaType, Score, SegmentType, SpannerKey, SpannerKind, SpannerProperties, StaffIndex, TempoChangeType,
    TrillType, VibratoType, VOICES,
};
use crate::source::{CustomLine, CustomLineStyle, ForeignDocument, NoteId, ShapeType, SmartShape, Termination};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

// ============================================================================
// CUSTOM LINES
// ============================================================================

/// Spanner kind and subtype read from a custom line
#[derive(Clone, Debug, PartialEq)]
pub struct LineClass {
    pub kind: SpannerKind,
    pub properties: SpannerProperties,
}

impl LineClass {
    fn of(kind: SpannerKind) -> Self {
        Self {
            kind,
            properties: SpannerProperties::default(),
        }
    }
}

// SMuFL wiggle ranges
const TRILL_GLYPHS: [std::ops::RangeInclusive<u32>; 2] = [0xE566..=0xE566, 0xEAA0..=0xEAA3];
const VIBRATO_GLYPHS: std::ops::RangeInclusive<u32> = 0xEAB0..=0xEACF;

fn vibrato_type(glyph: u32) -> VibratoType {
    match glyph {
        0xEAB0..=0xEAB9 => VibratoType::GuitarVibrato,
        0xEABA..=0xEAC3 => VibratoType::GuitarVibratoWide,
        0xEAC4..=0xEAC9 => VibratoType::VibratoSawtooth,
        _ => VibratoType::VibratoSawtoothWide,
    }
}

type TextRule = (Regex, fn() -> LineClass);

fn hairpin(kind: HairpinType) -> LineClass {
    let mut class = LineClass::of(SpannerKind::Hairpin);
    class.properties.hairpin = Some(kind);
    class
}

fn ottava(kind: OttavaType) -> LineClass {
    let mut class = LineClass::of(SpannerKind::Ottava);
    class.properties.ottava = Some(kind);
    class
}

fn tempo_change(kind: TempoChangeType) -> LineClass {
    let mut class = LineClass::of(SpannerKind::GradualTempoChange);
    class.properties.tempo_change = Some(kind);
    class
}

fn rule(pattern: &str, class: fn() -> LineClass) -> Option<TextRule> {
    match Regex::new(pattern) {
        Ok(regex) => Some((regex, class)),
        Err(err) => {
            log::error!("Invalid custom line pattern {}: {}", pattern, err);
            None
        }
    }
}

/// Text rules in priority order; the first match wins
static TEXT_RULES: Lazy<Vec<TextRule>> = Lazy::new(|| {
    [
        rule(r"(?i)^\s*(ped(\.|al)?|\x{E650})", || LineClass::of(SpannerKind::Pedal)),
        rule(r"(?i)^\s*(let\s*ring|l\.\s*v\.?)", || LineClass::of(SpannerKind::LetRing)),
        rule(r"(?i)^\s*(palm\s*mute|p\.\s*m\.?|pm\b)", || LineClass::of(SpannerKind::PalmMute)),
        rule(r"(?i)^\s*cresc", || hairpin(HairpinType::CrescLine)),
        rule(r"(?i)^\s*(dim|decresc)", || hairpin(HairpinType::DimLine)),
        rule(r"(?i)^\s*\(?(8vb|8va\s*bassa|8\s*ba)", || ottava(OttavaType::Ottava8vb)),
        rule(r"(?i)^\s*\(?(8va|8)\b", || ottava(OttavaType::Ottava8va)),
        rule(r"(?i)^\s*\(?15m(b|b\.|a\s*bassa)", || ottava(OttavaType::Ottava15mb)),
        rule(r"(?i)^\s*\(?15(ma)?\b", || ottava(OttavaType::Ottava15ma)),
        rule(r"(?i)^\s*\(?22mb", || ottava(OttavaType::Ottava22mb)),
        rule(r"(?i)^\s*\(?22(ma)?\b", || ottava(OttavaType::Ottava22ma)),
        rule(r"(?i)^\s*accel", || tempo_change(TempoChangeType::Accelerando)),
        rule(r"(?i)^\s*allarg", || tempo_change(TempoChangeType::Allargando)),
        rule(r"(?i)^\s*rall", || tempo_change(TempoChangeType::Rallentando)),
        rule(r"(?i)^\s*rit", || tempo_change(TempoChangeType::Ritardando)),
        rule(r"(?i)^\s*string", || tempo_change(TempoChangeType::Stringendo)),
    ]
    .into_iter()
    .flatten()
    .collect()
});

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Classify a custom line: glyph lines first (trill, then vibrato), then the
/// start and center texts against the text rules. Anything else is a text line.
pub fn classify_custom_line(line: &CustomLine) -> LineClass {
    if line.line_style == CustomLineStyle::Char {
        if let Some(glyph) = line.glyph {
            if TRILL_GLYPHS.iter().any(|r| r.contains(&glyph)) {
                let mut class = LineClass::of(SpannerKind::Trill);
                class.properties.trill = Some(TrillType::Trill);
                return class;
            }
            if VIBRATO_GLYPHS.contains(&glyph) {
                let mut class = LineClass::of(SpannerKind::Vibrato);
                class.properties.vibrato = Some(vibrato_type(glyph));
                return class;
            }
        }
    }

    let texts = [line.left_start_text.as_str(), line.center_text.as_str()];
    let matched = TEXT_RULES
        .iter()
        .find(|(regex, _)| texts.iter().any(|t| regex.is_match(t)))
        .map(|(_, class)| class());
    if let Some(class) = matched {
        return class;
    }

    let mut class = LineClass::of(SpannerKind::TextLine);
    let props = &mut class.properties;
    props.line_style = Some(match line.line_style {
        CustomLineStyle::Dashed => LineStyle::Dashed,
        CustomLineStyle::Solid | CustomLineStyle::Char => LineStyle::Solid,
    });
    props.begin_hook = (line.start_hook != 0).then(|| convert::evpu_to_spatium(line.start_hook));
    props.end_hook = (line.end_hook != 0).then(|| convert::evpu_to_spatium(line.end_hook));
    props.begin_text = non_empty(&line.left_start_text).or_else(|| non_empty(&line.center_text));
    props.continue_text = non_empty(&line.left_continue_text);
    props.end_text = non_empty(&line.right_end_text);
    class
}

// ============================================================================
// ANCHORS
// ============================================================================

/// What one end of a spanner attaches to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    Note(NoteKey),
    Chord(ChordRestKey),
    /// Absolute tick on a staff, carried by a TimeTick segment of the measure
    TimeTick(MeasureKey, Fraction, StaffIndex),
}

impl Anchor {
    fn is_entry(self) -> bool {
        matches!(self, Anchor::Note(_) | Anchor::Chord(_))
    }

    fn element(self) -> Option<ElementRef> {
        match self {
            Anchor::Note(note) => Some(ElementRef::Note(note)),
            Anchor::Chord(cr) => Some(ElementRef::ChordRest(cr)),
            Anchor::TimeTick(..) => None,
        }
    }

    fn tick(self, score: &Score) -> Option<Fraction> {
        match self {
            Anchor::TimeTick(_, tick, _) => Some(tick),
            other => other.element().and_then(|e| score.element_tick(e)),
        }
    }

    fn track(self, score: &Score) -> Option<usize> {
        match self {
            Anchor::TimeTick(_, _, staff) => Some(staff2track(staff)),
            other => other.element().and_then(|e| score.element_track(e)),
        }
    }
}

/// A shape with both ends resolved, ready to become a spanner
#[derive(Clone, Debug, PartialEq)]
pub struct ReadableSpanner {
    pub kind: SpannerKind,
    pub start_anchor: Anchor,
    pub end_anchor: Anchor,
    pub entry_based: bool,
    pub visible: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum End {
    Start,
    End,
}

impl End {
    fn name(self) -> &'static str {
        match self {
            End::Start => "start",
            End::End => "end",
        }
    }
}

fn one_tick() -> Result<Fraction, SpannerError> {
    Ok(Fraction::new(1, TICKS_PER_WHOLE)?)
}

fn wants_notes(kind: SpannerKind) -> bool {
    matches!(kind, SpannerKind::Glissando | SpannerKind::GuitarBend | SpannerKind::NoteLine)
}

/// Resolve one end of a shape.
///
/// An entry number resolves to its chord (or the given note of it); a bare
/// position resolves to a chord or rest starting there on the staff, else to
/// a time position. `None` when neither the entry nor the position is usable.
fn resolve_anchor(
    score: &mut Score,
    map: &ScoreMap,
    index: &EntryIndex,
    shape: &SmartShape,
    kind: SpannerKind,
    end: End,
) -> Result<Option<Anchor>, SpannerError> {
    let (term, note_id): (&Termination, Option<NoteId>) = match end {
        End::Start => (&shape.start, shape.start_note_id),
        End::End => (&shape.end, shape.end_note_id),
    };

    if let Some(entry) = term.entry {
        let note = note_id
            .filter(|_| shape.entry_based && kind != SpannerKind::Slur)
            .and_then(|id| index.note(entry, id));
        if let Some(note) = note {
            return Ok(Some(Anchor::Note(note)));
        }
        if let Some(cr) = index.chord_rest(entry) {
            return Ok(Some(Anchor::Chord(cr)));
        }
    }

    let (Some(staff), Some(measure)) = (map.staff_index(term.staff), map.measure_key(term.measure)) else {
        return Ok(None);
    };
    let Some((measure_tick, measure_len)) = score.measure(measure).map(|m| (m.tick, m.ticks)) else {
        return Ok(None);
    };
    let Some(position) = term.position.resolve() else {
        return Ok(None);
    };
    let mut tick = measure_tick.checked_add(position)?;

    if term.entry.is_none() && position < measure_len {
        let track = staff2track(staff);
        if let Some(cr) = (track..track + VOICES).find_map(|t| score.chord_rest_at(tick, t)) {
            return Ok(Some(Anchor::Chord(cr)));
        }
    }

    // A start on a closing barline belongs to the next measure, an end on an
    // opening barline to the previous one
    if end == End::Start && position == measure_len {
        tick = tick.checked_add(one_tick()?)?;
    } else if end == End::End && position.is_zero() && tick.is_positive() {
        tick = tick.checked_sub(one_tick()?)?;
    }

    if end == End::End && tick == score.end_tick() {
        // end of piece; no segment exists there
        return Ok(Some(Anchor::TimeTick(measure, tick, staff)));
    }
    let Some(target) = score.tick2measure(tick) else {
        return Ok(None);
    };
    score.segment_at(target, SegmentType::TimeTick, tick)?;
    Ok(Some(Anchor::TimeTick(target, tick, staff)))
}

/// Check both anchors against what `kind` can attach to
fn validate(score: &Score, spanner: &ReadableSpanner) -> Result<(), &'static str> {
    let (start, end) = (spanner.start_anchor, spanner.end_anchor);
    if wants_notes(spanner.kind) && !(matches!(start, Anchor::Note(_)) && matches!(end, Anchor::Note(_))) {
        return Err("needs note anchors at both ends");
    }
    if spanner.kind == SpannerKind::Slur && !(matches!(start, Anchor::Chord(_)) && matches!(end, Anchor::Chord(_))) {
        return Err("slur needs chord or rest anchors at both ends");
    }
    if spanner.entry_based && !(start.is_entry() && end.is_entry()) {
        return Err("entry-attached shape does not resolve to entries");
    }
    if let Anchor::TimeTick(_, tick, _) = end {
        if tick == score.end_tick() && spanner.kind != SpannerKind::Ottava {
            return Err("only an ottava may end at the end of the piece");
        }
    }
    Ok(())
}

// ============================================================================
// IMPORT
// ============================================================================

/// Counters reported after an import
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeStats {
    pub created: usize,
    pub dropped: usize,
    /// Shapes imported elsewhere (lyric hyphens and word extensions)
    pub skipped: usize,
}

fn shape_properties(shape: ShapeType, kind: SpannerKind) -> SpannerProperties {
    let mut props = SpannerProperties::default();
    match kind {
        SpannerKind::Slur => {
            props.slur_style = Some(convert::slur_style(shape));
            props.direction = convert::slur_direction(shape);
        }
        SpannerKind::Hairpin => props.hairpin = convert::hairpin_type(shape),
        SpannerKind::Ottava => props.ottava = convert::ottava_type(shape),
        SpannerKind::Trill => props.trill = Some(TrillType::Trill),
        SpannerKind::TextLine => {
            props.line_style = Some(convert::line_style(shape));
            if let Some((begin, end)) = convert::hook_heights(shape) {
                props.begin_hook = (begin != 0.0).then_some(begin);
                props.end_hook = (end != 0.0).then_some(end);
            }
        }
        _ => {}
    }
    props
}

/// Build the spanner for one shape and add it to the score
fn import_shape(
    doc: &dyn ForeignDocument,
    score: &mut Score,
    map: &ScoreMap,
    index: &EntryIndex,
    shape: &SmartShape,
) -> Result<SpannerKey, SpannerError> {
    let (kind, properties) = match convert::spanner_kind(shape.shape_type) {
        Some(kind) => (kind, shape_properties(shape.shape_type, kind)),
        None => {
            let line = shape.line_id.unwrap_or_default();
            let custom = doc.custom_line(line).ok_or(SpannerError::MissingCustomLine {
                shape: shape.id,
                line,
            })?;
            let class = classify_custom_line(custom);
            (class.kind, class.properties)
        }
    };

    let unresolved = |end: End| SpannerError::UnresolvedEndpoint {
        shape: shape.id,
        end: end.name(),
    };
    let start_anchor =
        resolve_anchor(score, map, index, shape, kind, End::Start)?.ok_or_else(|| unresolved(End::Start))?;
    let end_anchor = resolve_anchor(score, map, index, shape, kind, End::End)?.ok_or_else(|| unresolved(End::End))?;
    let readable = ReadableSpanner {
        kind,
        start_anchor,
        end_anchor,
        entry_based: shape.entry_based,
        visible: !shape.hidden,
    };
    validate(score, &readable).map_err(|detail| SpannerError::InvalidAnchor { shape: shape.id, detail })?;

    let mut spanner = Score::create_spanner(kind);
    spanner.tick = start_anchor.tick(score).ok_or_else(|| unresolved(End::Start))?;
    spanner.tick2 = end_anchor.tick(score).ok_or_else(|| unresolved(End::End))?;
    spanner.visible = readable.visible;
    spanner.properties = properties;

    if readable.entry_based {
        spanner.anchor = match (start_anchor, end_anchor) {
            (Anchor::Note(_), Anchor::Note(_)) => AnchorMode::Note,
            _ => AnchorMode::Chord,
        };
        spanner.track = start_anchor.track(score).ok_or_else(|| unresolved(End::Start))?;
        spanner.track2 = end_anchor.track(score).ok_or_else(|| unresolved(End::End))?;
        spanner.start_element = start_anchor.element();
        spanner.end_element = end_anchor.element();
    } else {
        spanner.anchor = if kind == SpannerKind::Slur {
            AnchorMode::Chord
        } else {
            AnchorMode::Segment
        };
        let staff_of = |anchor: Anchor| anchor.track(score).map(|t| staff2track(track2staff(t)));
        spanner.track = staff_of(start_anchor).ok_or_else(|| unresolved(End::Start))?;
        spanner.track2 = staff_of(end_anchor).ok_or_else(|| unresolved(End::End))?;
        if kind == SpannerKind::Slur {
            spanner.start_element = start_anchor.element();
            spanner.end_element = end_anchor.element();
        }
    }
    if spanner.tick2 < spanner.tick {
        return Err(SpannerError::InvalidAnchor {
            shape: shape.id,
            detail: "ends before it starts",
        });
    }

    Ok(score.add_spanner(spanner))
}

/// Turn the part's smart shapes into spanners.
///
/// Returns the created spanners paired with their shapes for positioning.
pub fn import_smart_shapes<'d>(
    doc: &'d dyn ForeignDocument,
    score: &mut Score,
    map: &ScoreMap,
    index: &EntryIndex,
    ctx: &PartContext<'_>,
    logger: &mut ImportLogger,
) -> (Vec<(SpannerKey, &'d SmartShape)>, ShapeStats) {
    let mut stats = ShapeStats::default();
    let mut created = Vec::new();

    for shape in doc.smart_shapes(ctx.part_id) {
        if convert::is_imported_elsewhere(shape.shape_type) {
            stats.skipped += 1;
            continue;
        }
        match import_shape(doc, score, map, index, shape) {
            Ok(key) => {
                stats.created += 1;
                created.push((key, shape));
            }
            Err(err) => {
                stats.dropped += 1;
                logger.warn(
                    SourceLocation::new(shape.start.staff, shape.start.measure),
                    "spanner_dropped",
                    err.to_string(),
                );
            }
        }
    }
    log::debug!("Imported {} smart shapes, dropped {}", stats.created, stats.dropped);
    (created, stats)
}

/// Lay out each spanner and apply the source endpoint offsets to its first
/// and last segment
pub fn position_spanners(score: &mut Score, created: &[(SpannerKey, &SmartShape)], layout: &dyn LayoutEngine) {
    for (key, shape) in created {
        let Some(spanner) = score.spanner(*key) else {
            continue;
        };
        let mut segments = layout.spanner_segments(score, spanner);
        if let Some(first) = segments.first_mut() {
            first.offset = convert::evpu_point(shape.start.horz_offset, shape.start.vert_offset);
        }
        if let Some(last) = segments.last_mut() {
            last.offset2 = convert::evpu_point(shape.end.horz_offset, shape.end.vert_offset);
        }
        if let Some(spanner) = score.spanner_mut(*key) {
            spanner.segments = segments;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::entries::EntryIndex;
    use crate::import::scoremap::{import_entries, import_measures, import_parts};
    use crate::import::ImportOptions;
    use crate::score::{SpannerSegmentType, SystemLayout};
    use crate::source::{DocumentBuilder, MemoryDocument, RawFraction, SCORE_PART_ID};

    fn frac(n: i64, d: i64) -> Fraction {
        Fraction::new(n, d).unwrap()
    }

    fn line(style: CustomLineStyle, glyph: Option<u32>, text: &str) -> CustomLine {
        CustomLine {
            id: 1,
            line_style: style,
            glyph,
            left_start_text: text.to_string(),
            ..Default::default()
        }
    }

    fn shape(id: u32, shape_type: ShapeType, start: Termination, end: Termination) -> SmartShape {
        SmartShape {
            id,
            part: SCORE_PART_ID,
            shape_type,
            entry_based: false,
            hidden: false,
            start,
            end,
            start_note_id: None,
            end_note_id: None,
            line_id: None,
        }
    }

    /// Two staves, four 4/4 measures; staff 1 measure 1 has four quarter notes (entries 1-4)
    fn builder() -> DocumentBuilder {
        DocumentBuilder::new()
            .staff(1, "Violin")
            .staff(2, "Cello")
            .measures(4, 4, 1024)
            .voice(1, 1, 0, |v| v.note(1024, &[0]).note(1024, &[1]).note(1024, &[2]).note(1024, &[3]))
    }

    fn import(doc: &MemoryDocument) -> (Score, Vec<SpannerKey>, ShapeStats, ImportLogger) {
        import_with(doc, ImportOptions::default())
    }

    fn import_with(doc: &MemoryDocument, options: ImportOptions) -> (Score, Vec<SpannerKey>, ShapeStats, ImportLogger) {
        let mut score = Score::new();
        let mut logger = ImportLogger::default();
        let ctx = PartContext {
            part_id: SCORE_PART_ID,
            options: &options,
        };
        let mut map = import_parts(doc, &mut score, &mut logger).unwrap();
        import_measures(doc, &mut score, &mut map, &mut logger).unwrap();
        let mut index = EntryIndex::new();
        import_entries(doc, &mut score, &map, &ctx, &mut index, &mut logger).unwrap();
        let (created, stats) = import_smart_shapes(doc, &mut score, &map, &index, &ctx, &mut logger);
        position_spanners(&mut score, &created, &SystemLayout::new(2));
        let keys = created.into_iter().map(|(k, _)| k).collect();
        (score, keys, stats, logger)
    }

    #[test]
    fn test_custom_line_glyphs() {
        let trill = classify_custom_line(&line(CustomLineStyle::Char, Some(0xEAA2), ""));
        assert_eq!(trill.kind, SpannerKind::Trill);
        let vibrato = classify_custom_line(&line(CustomLineStyle::Char, Some(0xEABC), "cresc."));
        assert_eq!(vibrato.kind, SpannerKind::Vibrato);
        assert_eq!(vibrato.properties.vibrato, Some(VibratoType::GuitarVibratoWide));
        // glyphs only count on glyph lines
        let solid = classify_custom_line(&line(CustomLineStyle::Solid, Some(0xEAA2), ""));
        assert_eq!(solid.kind, SpannerKind::TextLine);
    }

    #[test]
    fn test_custom_line_texts_in_priority_order() {
        let kind = |text| classify_custom_line(&line(CustomLineStyle::Dashed, None, text));
        assert_eq!(kind("Ped.").kind, SpannerKind::Pedal);
        assert_eq!(kind("let ring").kind, SpannerKind::LetRing);
        assert_eq!(kind("P.M.").kind, SpannerKind::PalmMute);
        assert_eq!(kind("cresc.").properties.hairpin, Some(HairpinType::CrescLine));
        assert_eq!(kind("DIM.").properties.hairpin, Some(HairpinType::DimLine));
        assert_eq!(kind("8vb").properties.ottava, Some(OttavaType::Ottava8vb));
        assert_eq!(kind("8va").properties.ottava, Some(OttavaType::Ottava8va));
        assert_eq!(kind("15ma").properties.ottava, Some(OttavaType::Ottava15ma));
        assert_eq!(kind("rit.").properties.tempo_change, Some(TempoChangeType::Ritardando));
        assert_eq!(kind("accel.").kind, SpannerKind::GradualTempoChange);
    }

    #[test]
    fn test_unmatched_custom_line_is_text_line() {
        let mut custom = line(CustomLineStyle::Dashed, None, "sul pont.");
        custom.end_hook = 24;
        custom.right_end_text = "ord.".into();
        let class = classify_custom_line(&custom);
        assert_eq!(class.kind, SpannerKind::TextLine);
        assert_eq!(class.properties.line_style, Some(LineStyle::Dashed));
        assert_eq!(class.properties.begin_text.as_deref(), Some("sul pont."));
        assert_eq!(class.properties.end_text.as_deref(), Some("ord."));
        assert_eq!(class.properties.begin_hook, None);
        assert_eq!(class.properties.end_hook, Some(1.0));
    }

    #[test]
    fn test_entry_slur_attaches_to_chords() {
        let mut slur = shape(1, ShapeType::SlurUp, Termination::entry(1, 1, 1), Termination::entry(1, 1, 4));
        slur.entry_based = true;
        let doc = builder().smart_shape(slur).build();
        let (score, keys, stats, _) = import(&doc);

        assert_eq!(stats.created, 1);
        let spanner = score.spanner(keys[0]).unwrap();
        assert_eq!(spanner.anchor, AnchorMode::Chord);
        assert_eq!((spanner.tick, spanner.tick2), (Fraction::ZERO, frac(3, 4)));
        assert!(matches!(spanner.start_element, Some(ElementRef::ChordRest(_))));
        assert_eq!(spanner.properties.direction, crate::score::Direction::Up);
    }

    #[test]
    fn test_glissando_needs_notes() {
        let mut gliss = shape(1, ShapeType::Glissando, Termination::entry(1, 1, 1), Termination::entry(1, 1, 2));
        gliss.entry_based = true;
        gliss.start_note_id = Some(1);
        gliss.end_note_id = Some(1);
        let mut broken = gliss.clone();
        broken.id = 2;
        broken.end_note_id = None;
        let doc = builder().smart_shape(gliss).smart_shape(broken).build();
        let (score, keys, stats, logger) = import(&doc);

        assert_eq!((stats.created, stats.dropped), (1, 1));
        assert_eq!(score.spanner(keys[0]).unwrap().anchor, AnchorMode::Note);
        assert_eq!(logger.diagnostics().of_kind("spanner_dropped").count(), 1);
    }

    #[test]
    fn test_bare_time_slur_dropped_others_kept() {
        // nothing on staff 2, so the slur can only get time positions
        let slur = shape(
            1,
            ShapeType::SlurAuto,
            Termination::at(2, 1, RawFraction(1, 4)),
            Termination::at(2, 2, RawFraction(1, 2)),
        );
        let hairpin = shape(
            2,
            ShapeType::Crescendo,
            Termination::at(2, 1, RawFraction(1, 4)),
            Termination::at(2, 2, RawFraction(1, 2)),
        );
        let doc = builder().smart_shape(slur).smart_shape(hairpin).build();
        let (score, keys, stats, _) = import(&doc);

        assert_eq!((stats.created, stats.dropped), (1, 1));
        let spanner = score.spanner(keys[0]).unwrap();
        assert_eq!(spanner.kind, SpannerKind::Hairpin);
        assert_eq!(spanner.anchor, AnchorMode::Segment);
        assert_eq!((spanner.tick, spanner.tick2), (frac(1, 4), frac(3, 2)));
        assert_eq!(spanner.track, 4);
        assert_eq!(spanner.properties.hairpin, Some(HairpinType::CrescHairpin));
        let time_ticks = score
            .measures()
            .flat_map(|(_, m)| m.segments.iter())
            .filter(|k| score.segment(**k).unwrap().kind == SegmentType::TimeTick)
            .count();
        assert!(time_ticks >= 2);
    }

    #[test]
    fn test_position_resolves_to_chord_when_present() {
        let hairpin = shape(
            1,
            ShapeType::Decrescendo,
            Termination::at(1, 1, RawFraction(1, 4)),
            Termination::at(1, 1, RawFraction(3, 4)),
        );
        let doc = builder().smart_shape(hairpin).build();
        let (score, keys, _, _) = import(&doc);
        let spanner = score.spanner(keys[0]).unwrap();
        assert_eq!(spanner.anchor, AnchorMode::Segment);
        assert_eq!((spanner.tick, spanner.tick2), (frac(1, 4), frac(3, 4)));
    }

    #[test]
    fn test_barline_nudging() {
        let line = shape(
            1,
            ShapeType::DashLineUp,
            Termination::at(2, 1, RawFraction(1, 1)),
            Termination::at(2, 3, RawFraction(0, 1)),
        );
        let doc = builder().smart_shape(line).build();
        let options = ImportOptions {
            ensure_voice_one: false,
            ..Default::default()
        };
        let (score, keys, _, _) = import_with(&doc, options);
        let spanner = score.spanner(keys[0]).unwrap();
        let tick = frac(1, TICKS_PER_WHOLE);
        assert_eq!(spanner.tick, Fraction::ONE.checked_add(tick).unwrap());
        assert_eq!(spanner.tick2, frac(2, 1).checked_sub(tick).unwrap());
        assert_eq!(spanner.properties.line_style, Some(LineStyle::Dashed));
        assert_eq!(spanner.properties.end_hook, Some(-1.0));
        assert_eq!(spanner.properties.begin_hook, None);
    }

    #[test]
    fn test_ottava_may_end_at_end_of_piece() {
        let to_end = |id, shape_type| {
            shape(
                id,
                shape_type,
                Termination::at(2, 3, RawFraction(0, 1)),
                Termination::at(2, 4, RawFraction(1, 1)),
            )
        };
        let doc = builder()
            .smart_shape(to_end(1, ShapeType::OctaveUp))
            .smart_shape(to_end(2, ShapeType::Crescendo))
            .build();
        let (score, keys, stats, _) = import(&doc);
        assert_eq!((stats.created, stats.dropped), (1, 1));
        let ottava = score.spanner(keys[0]).unwrap();
        assert_eq!(ottava.tick2, score.end_tick());
        assert_eq!(ottava.properties.ottava, Some(OttavaType::Ottava8va));
    }

    #[test]
    fn test_offsets_on_first_and_last_segment() {
        let mut start = Termination::at(2, 1, RawFraction(1, 4));
        start.horz_offset = 24;
        start.vert_offset = 48;
        let mut end = Termination::at(2, 4, RawFraction(1, 2));
        end.horz_offset = -12;
        let hairpin = shape(1, ShapeType::Crescendo, start, end);
        let doc = builder().smart_shape(hairpin).build();
        let (score, keys, _, _) = import(&doc);

        let segments = &score.spanner(keys[0]).unwrap().segments;
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].kind, SpannerSegmentType::Begin);
        assert_eq!(segments[0].offset, (1.0, -2.0));
        assert_eq!(segments[1].offset2, (-0.5, -0.0));
    }

    #[test]
    fn test_missing_custom_line_and_skipped_hyphen() {
        let mut custom = shape(
            1,
            ShapeType::CustomLine,
            Termination::at(1, 1, RawFraction(0, 1)),
            Termination::at(1, 2, RawFraction(0, 1)),
        );
        custom.line_id = Some(9);
        let hyphen = shape(
            2,
            ShapeType::Hyphen,
            Termination::at(1, 1, RawFraction(0, 1)),
            Termination::at(1, 1, RawFraction(1, 4)),
        );
        let doc = builder().smart_shape(custom).smart_shape(hyphen).build();
        let (_, _, stats, logger) = import(&doc);
        assert_eq!((stats.created, stats.dropped, stats.skipped), (0, 1, 1));
        let message = &logger.diagnostics().of_kind("spanner_dropped").next().unwrap().message;
        assert!(message.contains("custom line 9"));
    }
}
