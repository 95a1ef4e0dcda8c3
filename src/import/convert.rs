//! Source → destination value conversions
//!
//! Pure lookup tables and unit conversions; nothing here touches the score.

use crate::fraction::Fraction;
use crate::score::{
    AccidentalType, BracketType, ClefType, Direction, Duration, DurationType, HairpinType, LineStyle, OttavaType,
    SlurStyle, SpannerKind, TimeSignature, TupletBracketType, TupletNumberType,
};
use crate::source::{
    BracketStyle, Edu, Evpu, ShapeType, SourceTimeSig, TupletBracketStyle, TupletNumberStyle,
    EDU_PER_WHOLE, EVPU_PER_SPACE,
};

// ============================================================================
// DURATIONS
// ============================================================================

/// Note values of the source format, longest first
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceNoteType {
    Maxima,
    Longa,
    Breve,
    Whole,
    Half,
    Quarter,
    Eighth,
    Note16th,
    Note32nd,
    Note64th,
    Note128th,
    Note256th,
    Note512th,
    Note1024th,
    Note2048th,
    Note4096th,
}

impl SourceNoteType {
    const ALL: [SourceNoteType; 16] = [
        SourceNoteType::Maxima,
        SourceNoteType::Longa,
        SourceNoteType::Breve,
        SourceNoteType::Whole,
        SourceNoteType::Half,
        SourceNoteType::Quarter,
        SourceNoteType::Eighth,
        SourceNoteType::Note16th,
        SourceNoteType::Note32nd,
        SourceNoteType::Note64th,
        SourceNoteType::Note128th,
        SourceNoteType::Note256th,
        SourceNoteType::Note512th,
        SourceNoteType::Note1024th,
        SourceNoteType::Note2048th,
        SourceNoteType::Note4096th,
    ];

    /// Undotted length in EDUs
    pub fn edu(self) -> Edu {
        const MAXIMA: Edu = EDU_PER_WHOLE * 8;
        MAXIMA >> (self as u32)
    }

    fn duration_type(self) -> Option<DurationType> {
        match self {
            SourceNoteType::Maxima | SourceNoteType::Note2048th | SourceNoteType::Note4096th => None,
            SourceNoteType::Longa => Some(DurationType::Long),
            SourceNoteType::Breve => Some(DurationType::Breve),
            SourceNoteType::Whole => Some(DurationType::Whole),
            SourceNoteType::Half => Some(DurationType::Half),
            SourceNoteType::Quarter => Some(DurationType::Quarter),
            SourceNoteType::Eighth => Some(DurationType::Eighth),
            SourceNoteType::Note16th => Some(DurationType::D16th),
            SourceNoteType::Note32nd => Some(DurationType::D32nd),
            SourceNoteType::Note64th => Some(DurationType::D64th),
            SourceNoteType::Note128th => Some(DurationType::D128th),
            SourceNoteType::Note256th => Some(DurationType::D256th),
            SourceNoteType::Note512th => Some(DurationType::D512th),
            SourceNoteType::Note1024th => Some(DurationType::D1024th),
        }
    }
}

/// Note value and dot count of an EDU duration.
///
/// The highest set bit gives the note value and each directly following
/// set bit one dot; any other bit pattern has no notated equivalent.
pub fn note_info_from_edu(edu: Edu) -> Option<(SourceNoteType, u32)> {
    if edu <= 0 {
        return None;
    }
    let base = SourceNoteType::ALL
        .iter()
        .copied()
        .find(|t| t.edu() <= edu)?;
    let mut remainder = edu - base.edu();
    let mut dots = 0;
    let mut bit = base.edu() >> 1;
    while remainder > 0 && bit > 0 && remainder >= bit {
        remainder -= bit;
        dots += 1;
        bit >>= 1;
    }
    (remainder == 0).then_some((base, dots))
}

/// Destination duration of an EDU value; `None` when it has no equivalent
pub fn duration_from_edu(edu: Edu) -> Option<Duration> {
    let (note_type, dots) = note_info_from_edu(edu)?;
    let kind = note_type.duration_type()?;
    let dots = u8::try_from(dots).ok().filter(|d| *d <= Duration::MAX_DOTS)?;
    Some(Duration::new(kind, dots))
}

/// Length in whole notes of an EDU value
pub fn edu_to_fraction(edu: Edu) -> Option<Fraction> {
    Fraction::new(i64::from(edu), i64::from(EDU_PER_WHOLE)).ok()
}

/// Largest standard (possibly dotted) durations summing to at most `length`,
/// longest first. The remainder, if any, is returned alongside.
pub fn decompose_duration(length: Fraction) -> (Vec<Duration>, Fraction) {
    let mut parts = Vec::new();
    let mut remaining = length;
    while remaining.is_positive() {
        let next = DurationType::ALL
            .iter()
            .filter(|kind| **kind != DurationType::Long)
            .flat_map(|kind| (0..=Duration::MAX_DOTS).map(move |dots| Duration::new(*kind, dots)))
            .filter_map(|d| d.fraction().ok().map(|f| (d, f)))
            .filter(|(_, f)| *f <= remaining)
            .max_by_key(|(_, f)| *f);
        let Some((duration, value)) = next else {
            break;
        };
        match remaining.checked_sub(value) {
            Ok(rest) => remaining = rest,
            Err(_) => break,
        }
        parts.push(duration);
    }
    (parts, remaining)
}

// ============================================================================
// PITCH
// ============================================================================

const STEP_SEMITONES: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];
/// Tonal pitch class of each natural step, C through B
const STEP_TPC: [i32; 7] = [14, 16, 18, 13, 15, 17, 19];
const MAX_ALTER: i32 = 3;
/// Tonal pitch classes representable with at most three accidentals
const TPC_MIN: i32 = 13 - 7 * MAX_ALTER;
const TPC_MAX: i32 = 19 + 7 * MAX_ALTER;

/// Pitch and spelling of one note
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Spelling {
    pub pitch: u8,
    pub tpc: i32,
    pub alter: i32,
    /// False when the source spelling had to be replaced
    pub exact: bool,
}

fn tpc_alter(tpc: i32) -> i32 {
    (tpc - 13).div_euclid(7)
}

fn tpc_pitch_class(tpc: i32) -> i32 {
    ((tpc - 14) * 7).rem_euclid(12)
}

/// Spelling of a pitch class closest to C on the line of fifths; ties go to the sharp side
fn nearest_tpc(pitch_class: i32) -> i32 {
    (TPC_MIN..=TPC_MAX)
        .filter(|t| tpc_pitch_class(*t) == pitch_class)
        .min_by_key(|t| ((t - 14).abs(), -t))
        .unwrap_or(14)
}

/// MIDI pitch and tonal pitch class of a diatonic level plus alteration.
///
/// Level 0 is middle C (MIDI 60). Any input is accepted; out-of-range
/// pitches are clamped and reported as inexact.
pub fn spell_pitch(harm_lev: i32, harm_alt: i32) -> Spelling {
    let abs_step = 35 + i64::from(harm_lev);
    let octave = abs_step.div_euclid(7);
    let step = abs_step.rem_euclid(7) as usize;
    let raw = 12 * octave + i64::from(STEP_SEMITONES[step]) + i64::from(harm_alt);
    let pitch = raw.clamp(0, 127) as i32;

    if harm_alt.unsigned_abs() <= MAX_ALTER as u32 && raw == i64::from(pitch) {
        Spelling {
            pitch: pitch as u8,
            tpc: STEP_TPC[step] + 7 * harm_alt,
            alter: harm_alt,
            exact: true,
        }
    } else {
        let tpc = nearest_tpc(pitch.rem_euclid(12));
        Spelling {
            pitch: pitch as u8,
            tpc,
            alter: tpc_alter(tpc),
            exact: false,
        }
    }
}

pub fn accidental_type(alter: i32) -> Option<AccidentalType> {
    AccidentalType::from_alter(alter)
}

// ============================================================================
// STRUCTURE
// ============================================================================

/// Clef of a source clef index; `None` for the blank clef and unknown indices
pub fn clef_type(index: u8) -> Option<ClefType> {
    match index {
        0 => Some(ClefType::G),
        1 => Some(ClefType::C3),
        2 => Some(ClefType::C4),
        3 => Some(ClefType::F),
        4 => Some(ClefType::Perc2),
        5 => Some(ClefType::G8vb),
        6 => Some(ClefType::F8vb),
        7 => Some(ClefType::FBaritone),
        8 => Some(ClefType::G1),
        9 => Some(ClefType::C5),
        10 => Some(ClefType::C2),
        11 => Some(ClefType::C1),
        12 => Some(ClefType::Perc),
        13 => Some(ClefType::G8va),
        14 => Some(ClefType::F8va),
        16 | 17 => Some(ClefType::Tab),
        _ => None,
    }
}

pub fn bracket_type(style: BracketStyle) -> Option<BracketType> {
    match style {
        BracketStyle::None => None,
        BracketStyle::ThickLine => Some(BracketType::Line),
        BracketStyle::BracketStraightHooks | BracketStyle::BracketCurvedHooks => Some(BracketType::Normal),
        BracketStyle::PianoBrace => Some(BracketType::Brace),
        BracketStyle::DeskBracket => Some(BracketType::Square),
    }
}

/// Barline offset in half spaces; source offsets point up
pub fn barline_offset(evpu: Evpu) -> i32 {
    (-f64::from(evpu) * 2.0 / EVPU_PER_SPACE).round() as i32
}

/// Instrument name up to the first line break
pub fn part_name(name: &str) -> String {
    name.lines().next().unwrap_or_default().trim().to_string()
}

/// Displayed signature of a measure.
///
/// The beat length is reduced to p/q and the count scaled by p, so two
/// dotted-quarter beats become 6/8. A fractional beat count is folded into
/// the beat length when it divides evenly; otherwise `None`.
pub fn simplify_time_sig(sig: &SourceTimeSig) -> Option<TimeSignature> {
    let count = sig.count.resolve_ratio()?;
    let mut beat_edu = i64::from(sig.beat_edu);
    let mut beats = count.numerator();
    if count.denominator() != 1 {
        if beat_edu % count.denominator() != 0 {
            return None;
        }
        beat_edu /= count.denominator();
    }
    let beat = Fraction::new(beat_edu, i64::from(EDU_PER_WHOLE)).ok()?;
    if !beat.is_positive() || beats <= 0 {
        return None;
    }
    beats = beats.checked_mul(beat.numerator())?;
    Some(TimeSignature::new(
        u32::try_from(beats).ok()?,
        u32::try_from(beat.denominator()).ok()?,
    ))
}

// ============================================================================
// TUPLETS
// ============================================================================

pub fn tuplet_number_type(style: TupletNumberStyle) -> TupletNumberType {
    match style {
        TupletNumberStyle::Nothing => TupletNumberType::NoText,
        TupletNumberStyle::Number => TupletNumberType::ShowNumber,
        TupletNumberStyle::UseRatio
        | TupletNumberStyle::RatioPlusDenominatorNote
        | TupletNumberStyle::RatioPlusBothNotes => TupletNumberType::ShowRelation,
    }
}

pub fn tuplet_bracket_type(style: TupletBracketStyle) -> TupletBracketType {
    match style {
        TupletBracketStyle::Always => TupletBracketType::ShowBracket,
        TupletBracketStyle::UnbeamedOnly | TupletBracketStyle::NeverBeamedOnBeamSide => {
            TupletBracketType::AutoBracket
        }
    }
}

/// Source graphic offset as a spatium point; the source y axis points up
pub fn evpu_point(x: Evpu, y: Evpu) -> (f64, f64) {
    (evpu_to_spatium(x), -evpu_to_spatium(y))
}

pub fn evpu_to_spatium(evpu: Evpu) -> f64 {
    f64::from(evpu) / EVPU_PER_SPACE
}

// ============================================================================
// SMART SHAPES
// ============================================================================

/// Spanner kind of a declared shape type.
///
/// `None` for shapes imported elsewhere (hyphens, word extensions) and for
/// custom lines, which are classified from their line definition.
pub fn spanner_kind(shape: ShapeType) -> Option<SpannerKind> {
    use ShapeType::*;
    match shape {
        SlurDown | SlurUp | SlurAuto | DashSlurDown | DashSlurUp | DashSlurAuto | DashContourSlurDown
        | DashContourSlurUp | DashContourSlurAuto => Some(SpannerKind::Slur),
        Crescendo | Decrescendo => Some(SpannerKind::Hairpin),
        OctaveDown | OctaveUp | TwoOctaveDown | TwoOctaveUp => Some(SpannerKind::Ottava),
        Trill | TrillExtension => Some(SpannerKind::Trill),
        Glissando | TabSlide => Some(SpannerKind::Glissando),
        BendHat | BendCurve => Some(SpannerKind::GuitarBend),
        DashLineUp | DashLineDown | DashLine | SolidLine | SolidLineDown | SolidLineUp | SolidLineDownBoth
        | SolidLineUpBoth | DashLineDownBoth | DashLineUpBoth | SolidLineUpLeft | SolidLineDownLeft
        | DashLineUpLeft | DashLineDownLeft | SolidLineUpDown | SolidLineDownUp | DashLineUpDown
        | DashLineDownUp => Some(SpannerKind::TextLine),
        CustomLine | Hyphen | WordExtension => None,
    }
}

pub fn is_imported_elsewhere(shape: ShapeType) -> bool {
    matches!(shape, ShapeType::Hyphen | ShapeType::WordExtension)
}

pub fn slur_style(shape: ShapeType) -> SlurStyle {
    use ShapeType::*;
    match shape {
        DashSlurDown | DashSlurUp | DashSlurAuto | DashContourSlurDown | DashContourSlurUp | DashContourSlurAuto => {
            SlurStyle::Dashed
        }
        _ => SlurStyle::Solid,
    }
}

pub fn slur_direction(shape: ShapeType) -> Direction {
    use ShapeType::*;
    match shape {
        SlurDown | DashSlurDown | DashContourSlurDown => Direction::Down,
        SlurUp | DashSlurUp | DashContourSlurUp => Direction::Up,
        _ => Direction::Auto,
    }
}

pub fn hairpin_type(shape: ShapeType) -> Option<HairpinType> {
    match shape {
        ShapeType::Crescendo => Some(HairpinType::CrescHairpin),
        ShapeType::Decrescendo => Some(HairpinType::DimHairpin),
        _ => None,
    }
}

pub fn ottava_type(shape: ShapeType) -> Option<OttavaType> {
    match shape {
        ShapeType::OctaveDown => Some(OttavaType::Ottava8vb),
        ShapeType::OctaveUp => Some(OttavaType::Ottava8va),
        ShapeType::TwoOctaveDown => Some(OttavaType::Ottava15mb),
        ShapeType::TwoOctaveUp => Some(OttavaType::Ottava15ma),
        _ => None,
    }
}

pub fn line_style(shape: ShapeType) -> LineStyle {
    use ShapeType::*;
    match shape {
        DashLineUp | DashLineDown | DashLine | DashLineDownBoth | DashLineUpBoth | DashLineUpLeft
        | DashLineDownLeft | DashLineUpDown | DashLineDownUp => LineStyle::Dashed,
        _ => LineStyle::Solid,
    }
}

/// Begin and end hook heights in spaces (positive points down)
pub fn hook_heights(shape: ShapeType) -> Option<(f64, f64)> {
    use ShapeType::*;
    match shape {
        DashLineUp | SolidLineUp => Some((0.0, -1.0)),
        DashLineDown | SolidLineDown => Some((0.0, 1.0)),
        SolidLineDownBoth | DashLineDownBoth => Some((1.0, 1.0)),
        SolidLineUpBoth | DashLineUpBoth => Some((-1.0, -1.0)),
        SolidLineUpLeft | DashLineUpLeft => Some((-1.0, 0.0)),
        SolidLineDownLeft | DashLineDownLeft => Some((1.0, 0.0)),
        SolidLineUpDown | DashLineUpDown => Some((-1.0, 1.0)),
        SolidLineDownUp | DashLineDownUp => Some((1.0, -1.0)),
        _ => None,
    }
}
