//! Data types of the foreign (entry/duration oriented) document
//!
//! Field names follow the source format's vocabulary: positions are
//! fractions of a whole note measured from the start of the measure,
//! notated durations are in EDUs (1024 per quarter) and graphic offsets in
//! EVPUs (24 per staff space).

use crate::fraction::{Fraction, TICKS_PER_WHOLE};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

pub type StaffId = u32;
pub type MeasureId = u32;
pub type LayerIndex = u8;
pub type EntryNumber = u32;
pub type NoteId = u16;
pub type PartId = u32;
pub type ShapeId = u32;
pub type CustomLineId = u32;

/// Elapsed duration unit: 1024 per quarter note
pub type Edu = i32;
/// Graphic unit: 24 per staff space
pub type Evpu = i32;

pub const SCORE_PART_ID: PartId = 0;
pub const EDU_PER_WHOLE: Edu = 4096;
pub const EVPU_PER_SPACE: f64 = 24.0;
pub const MAX_LAYERS: usize = 4;

// ============================================================================
// FRACTIONS
// ============================================================================

/// Source-native fraction: possibly unreduced, possibly degenerate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawFraction(pub i64, pub i64);

impl RawFraction {
    pub fn whole(value: i64) -> Self {
        RawFraction(value, 1)
    }

    /// Reduced value, or `None` when the fraction is degenerate or does not
    /// land on an integral destination tick.
    pub fn resolve(self) -> Option<Fraction> {
        let value = Fraction::new(self.0, self.1).ok()?;
        value.exact_ticks(TICKS_PER_WHOLE)?;
        Some(value)
    }

    /// Reduced value without the tick alignment requirement (ratios).
    pub fn resolve_ratio(self) -> Option<Fraction> {
        Fraction::new(self.0, self.1).ok()
    }
}

impl From<Fraction> for RawFraction {
    fn from(value: Fraction) -> Self {
        RawFraction(value.numerator(), value.denominator())
    }
}

impl Default for RawFraction {
    fn default() -> Self {
        RawFraction(0, 1)
    }
}

// ============================================================================
// ENTRIES
// ============================================================================

/// One pitch of a note entry
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct SourceNote {
    pub note_id: NoteId,
    /// Diatonic displacement from middle C
    pub harm_lev: i32,
    /// Chromatic alteration in semitones
    #[serde(default)]
    pub harm_alt: i32,
    /// Accidental explicitly displayed
    #[serde(default)]
    pub freeze_acci: bool,
    /// Target staff when the note is notated on another staff
    #[serde(default)]
    pub cross_staff: Option<StaffId>,
    #[serde(default)]
    pub tie_start: bool,
    #[serde(default)]
    pub tie_end: bool,
}

impl SourceNote {
    pub fn new(note_id: NoteId, harm_lev: i32, harm_alt: i32) -> Self {
        Self {
            note_id,
            harm_lev,
            harm_alt,
            ..Default::default()
        }
    }
}

/// Clef change carried by an entry
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClefChange {
    pub clef_index: u8,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub generated: bool,
}

/// A note-chord or rest
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct SourceEntry {
    /// Document-wide identity, referenced by smart shapes
    pub number: EntryNumber,
    /// Notated duration (without tuplet scaling)
    pub duration: Edu,
    #[serde(default)]
    pub is_note: bool,
    #[serde(default)]
    pub notes: Vec<SourceNote>,
    /// Measure-relative start, in whole notes
    pub elapsed: RawFraction,
    /// Sounding (tuplet-scaled) duration, in whole notes
    pub actual_duration: RawFraction,
    #[serde(default)]
    pub grace_index: u8,
    #[serde(default)]
    pub v2_launch: bool,
    #[serde(default)]
    pub voice2: bool,
    /// Rest drawn at the default vertical position
    #[serde(default = "default_true")]
    pub float_rest: bool,
    #[serde(default)]
    pub freeze_stem: bool,
    #[serde(default)]
    pub up_stem: bool,
    /// Starts a new beam group
    #[serde(default)]
    pub beam_start: bool,
    /// Number of beams kept across a secondary beam break before this entry
    #[serde(default)]
    pub sec_beam_break: Option<u8>,
    #[serde(default)]
    pub clef_change: Option<ClefChange>,
}

fn default_true() -> bool {
    true
}

fn default_staff_lines() -> u8 {
    5
}

// ============================================================================
// TUPLETS
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TupletNumberStyle {
    Nothing,
    #[default]
    Number,
    UseRatio,
    RatioPlusDenominatorNote,
    RatioPlusBothNotes,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TupletBracketStyle {
    #[default]
    Always,
    UnbeamedOnly,
    NeverBeamedOnBeamSide,
}

/// Display settings of a tuplet
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct TupletDisplay {
    pub hidden: bool,
    pub number_style: TupletNumberStyle,
    pub bracket_style: TupletBracketStyle,
    pub smart_tuplet: bool,
    pub tup_off_x: Evpu,
    pub tup_off_y: Evpu,
    pub brack_off_x: Evpu,
    pub brack_off_y: Evpu,
    pub left_hook_ext: Evpu,
    pub right_hook_ext: Evpu,
    pub always_flat: bool,
    pub avoid_staff: bool,
    pub metric_center: bool,
    pub full_dura: bool,
}

/// A tuplet as stored in the source: a time span plus a ratio
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TupletDescriptor {
    /// Measure-relative start, in whole notes
    pub start: RawFraction,
    pub end: RawFraction,
    /// Actual notes over normal notes (3/2 for a triplet)
    pub ratio: RawFraction,
    /// Notated value of one tuplet unit
    pub base_duration: Edu,
    #[serde(default)]
    pub display: TupletDisplay,
    /// Marks a two-chord tremolo rather than a real tuplet
    #[serde(default)]
    pub tremolo: bool,
}

impl TupletDescriptor {
    pub fn new(start: RawFraction, end: RawFraction, ratio: RawFraction, base_duration: Edu) -> Self {
        Self {
            start,
            end,
            ratio,
            base_duration,
            display: TupletDisplay::default(),
            tremolo: false,
        }
    }
}

// ============================================================================
// STAVES, GROUPS, MEASURES
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SourceStaff {
    pub id: StaffId,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub abbreviated_name: String,
    #[serde(default = "default_staff_lines")]
    pub staff_lines: u8,
    #[serde(default)]
    pub first_clef_index: u8,
    #[serde(default)]
    pub transposed_clef: Option<u8>,
    #[serde(default)]
    pub top_barline_offset: Evpu,
    #[serde(default)]
    pub bottom_barline_offset: Evpu,
    #[serde(default)]
    pub hide_when_empty: bool,
}

impl SourceStaff {
    pub fn new(id: StaffId, full_name: &str) -> Self {
        Self {
            id,
            full_name: full_name.to_string(),
            abbreviated_name: String::new(),
            staff_lines: 5,
            first_clef_index: 0,
            transposed_clef: None,
            top_barline_offset: 0,
            bottom_barline_offset: 0,
            hide_when_empty: false,
        }
    }
}

/// Several staves forming one instrument (e.g. piano)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MultiStaffGroup {
    pub id: u32,
    pub staves: Vec<StaffId>,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub abbreviated_name: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BracketStyle {
    #[default]
    None,
    ThickLine,
    BracketStraightHooks,
    PianoBrace,
    BracketCurvedHooks,
    DeskBracket,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrawBarlineStyle {
    #[default]
    OnlyOnStaves,
    ThroughStaves,
    Mensurstriche,
}

/// Bracketed group of staves, addressed by scroll-order slot
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct SourceStaffGroup {
    pub start_slot: Option<usize>,
    pub end_slot: Option<usize>,
    #[serde(default)]
    pub bracket: BracketStyle,
    #[serde(default)]
    pub draw_barlines: DrawBarlineStyle,
}

/// Time signature as beats of a given EDU length; the beat count may be
/// fractional.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceTimeSig {
    pub count: RawFraction,
    pub beat_edu: Edu,
}

impl Default for SourceTimeSig {
    fn default() -> Self {
        Self {
            count: RawFraction::whole(4),
            beat_edu: 1024,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SourceMeasure {
    pub id: MeasureId,
    #[serde(default)]
    pub time_sig: SourceTimeSig,
}

/// Layer stem settings used to map layers onto voices
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerAttributes {
    pub layer: LayerIndex,
    #[serde(default)]
    pub freeze_layer: bool,
    #[serde(default)]
    pub freeze_stems_up: bool,
}

/// Entries and tuplets of one (staff, measure, layer)
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SourceFrame {
    #[serde(default)]
    pub part: PartId,
    pub staff: StaffId,
    pub measure: MeasureId,
    pub layer: LayerIndex,
    #[serde(default)]
    pub entries: Vec<SourceEntry>,
    #[serde(default)]
    pub tuplets: Vec<TupletDescriptor>,
}

// ============================================================================
// SMART SHAPES
// ============================================================================

/// Declared smart shape type (numeric in the source format)
#[derive(Serialize_repr, Deserialize_repr, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShapeType {
    SlurDown = 0,
    SlurUp = 1,
    Decrescendo = 2,
    Crescendo = 3,
    OctaveDown = 4,
    OctaveUp = 5,
    DashLineUp = 6,
    DashLineDown = 7,
    DashSlurDown = 8,
    DashSlurUp = 9,
    DashLine = 10,
    SolidLine = 11,
    SolidLineDown = 12,
    SolidLineUp = 13,
    Trill = 14,
    SlurAuto = 15,
    DashSlurAuto = 16,
    TrillExtension = 17,
    SolidLineDownBoth = 18,
    SolidLineUpBoth = 19,
    TwoOctaveDown = 20,
    TwoOctaveUp = 21,
    DashLineDownBoth = 22,
    DashLineUpBoth = 23,
    Glissando = 24,
    TabSlide = 25,
    BendHat = 26,
    BendCurve = 27,
    CustomLine = 28,
    SolidLineUpLeft = 29,
    SolidLineDownLeft = 30,
    DashLineUpLeft = 31,
    DashLineDownLeft = 32,
    SolidLineUpDown = 33,
    SolidLineDownUp = 34,
    DashLineUpDown = 35,
    DashLineDownUp = 36,
    Hyphen = 37,
    WordExtension = 38,
    DashContourSlurDown = 39,
    DashContourSlurUp = 40,
    DashContourSlurAuto = 41,
}

/// One end of a smart shape
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Termination {
    pub staff: StaffId,
    pub measure: MeasureId,
    /// Measure-relative position, in whole notes
    #[serde(default)]
    pub position: RawFraction,
    #[serde(default)]
    pub entry: Option<EntryNumber>,
    #[serde(default)]
    pub horz_offset: Evpu,
    #[serde(default)]
    pub vert_offset: Evpu,
}

impl Termination {
    pub fn at(staff: StaffId, measure: MeasureId, position: RawFraction) -> Self {
        Self {
            staff,
            measure,
            position,
            entry: None,
            horz_offset: 0,
            vert_offset: 0,
        }
    }

    pub fn entry(staff: StaffId, measure: MeasureId, entry: EntryNumber) -> Self {
        Self {
            entry: Some(entry),
            ..Self::at(staff, measure, RawFraction::default())
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SmartShape {
    pub id: ShapeId,
    #[serde(default)]
    pub part: PartId,
    pub shape_type: ShapeType,
    #[serde(default)]
    pub entry_based: bool,
    #[serde(default)]
    pub hidden: bool,
    pub start: Termination,
    pub end: Termination,
    #[serde(default)]
    pub start_note_id: Option<NoteId>,
    #[serde(default)]
    pub end_note_id: Option<NoteId>,
    #[serde(default)]
    pub line_id: Option<CustomLineId>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CustomLineStyle {
    #[default]
    Solid,
    Dashed,
    /// Repeated glyph
    Char,
}

/// User-defined line referenced by `ShapeType::CustomLine`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct CustomLine {
    pub id: CustomLineId,
    pub line_style: CustomLineStyle,
    /// Code point of the repeated glyph for `Char` lines
    pub glyph: Option<u32>,
    pub left_start_text: String,
    pub left_continue_text: String,
    pub right_end_text: String,
    pub center_text: String,
    /// Hook lengths; zero means no hook
    pub start_hook: Evpu,
    pub end_hook: Evpu,
}
