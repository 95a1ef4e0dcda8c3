//! Element types of the linear destination score
//!
//! Elements live in per-kind arenas owned by [`Score`](super::Score) and
//! refer to each other through typed keys.

use crate::errors::ArithmeticError;
use crate::fraction::Fraction;
use serde::{Deserialize, Serialize};

slotmap::new_key_type! {
    pub struct MeasureKey;
    pub struct SegmentKey;
    pub struct ChordRestKey;
    pub struct NoteKey;
    pub struct TupletKey;
    pub struct ClefKey;
    pub struct TimeSigKey;
    pub struct SpannerKey;
    pub struct TieKey;
    pub struct BeamKey;
    pub struct TremoloKey;
}

/// Voices per staff
pub const VOICES: usize = 4;

pub type StaffIndex = usize;
pub type TrackIndex = usize;

pub fn staff2track(staff: StaffIndex) -> TrackIndex {
    staff * VOICES
}

pub fn track2staff(track: TrackIndex) -> StaffIndex {
    track / VOICES
}

pub fn track2voice(track: TrackIndex) -> usize {
    track % VOICES
}

/// Handle to any element of the score
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementRef {
    Measure(MeasureKey),
    Segment(SegmentKey),
    ChordRest(ChordRestKey),
    Note(NoteKey),
    Tuplet(TupletKey),
    Clef(ClefKey),
    TimeSig(TimeSigKey),
    Spanner(SpannerKey),
    Tie(TieKey),
    Beam(BeamKey),
    Tremolo(TremoloKey),
}

// ============================================================================
// DURATIONS
// ============================================================================

/// Notated duration value
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationType {
    Long,
    Breve,
    Whole,
    Half,
    Quarter,
    Eighth,
    D16th,
    D32nd,
    D64th,
    D128th,
    D256th,
    D512th,
    D1024th,
}

impl DurationType {
    /// Longest first
    pub const ALL: [DurationType; 13] = [
        DurationType::Long,
        DurationType::Breve,
        DurationType::Whole,
        DurationType::Half,
        DurationType::Quarter,
        DurationType::Eighth,
        DurationType::D16th,
        DurationType::D32nd,
        DurationType::D64th,
        DurationType::D128th,
        DurationType::D256th,
        DurationType::D512th,
        DurationType::D1024th,
    ];

    /// Length in whole notes
    pub fn fraction(self) -> Fraction {
        let (n, d) = match self {
            DurationType::Long => (4, 1),
            DurationType::Breve => (2, 1),
            DurationType::Whole => (1, 1),
            DurationType::Half => (1, 2),
            DurationType::Quarter => (1, 4),
            DurationType::Eighth => (1, 8),
            DurationType::D16th => (1, 16),
            DurationType::D32nd => (1, 32),
            DurationType::D64th => (1, 64),
            DurationType::D128th => (1, 128),
            DurationType::D256th => (1, 256),
            DurationType::D512th => (1, 512),
            DurationType::D1024th => (1, 1024),
        };
        Fraction::new(n, d).unwrap_or(Fraction::ZERO)
    }

    pub fn has_flag(self) -> bool {
        self >= DurationType::Eighth
    }

    /// Number of flags or beams
    pub fn hooks(self) -> u32 {
        match self {
            DurationType::Long
            | DurationType::Breve
            | DurationType::Whole
            | DurationType::Half
            | DurationType::Quarter => 0,
            DurationType::Eighth => 1,
            DurationType::D16th => 2,
            DurationType::D32nd => 3,
            DurationType::D64th => 4,
            DurationType::D128th => 5,
            DurationType::D256th => 6,
            DurationType::D512th => 7,
            DurationType::D1024th => 8,
        }
    }
}

/// Duration type plus augmentation dots
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Duration {
    pub kind: DurationType,
    pub dots: u8,
}

impl Duration {
    pub const MAX_DOTS: u8 = 4;

    pub fn new(kind: DurationType, dots: u8) -> Self {
        Self { kind, dots }
    }

    pub fn plain(kind: DurationType) -> Self {
        Self { kind, dots: 0 }
    }

    /// Length in whole notes: base × (2 − 2^−dots)
    pub fn fraction(self) -> Result<Fraction, ArithmeticError> {
        let base = self.kind.fraction();
        let scale = 1i64 << self.dots;
        let factor = Fraction::new(2 * scale - 1, scale)?;
        base.checked_mul(factor)
    }
}

// ============================================================================
// STRUCTURE
// ============================================================================

/// Displayed time signature, kept unreduced (4/4 stays 4/4)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub const COMMON: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };

    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn duration(self) -> Result<Fraction, ArithmeticError> {
        Fraction::new(i64::from(self.numerator), i64::from(self.denominator))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub number: usize,
    pub tick: Fraction,
    pub ticks: Fraction,
    pub time_sig: TimeSignature,
    /// Ordered by (tick, segment type)
    pub segments: Vec<SegmentKey>,
    pub tuplets: Vec<TupletKey>,
}

impl Measure {
    pub fn end_tick(&self) -> Fraction {
        self.tick.checked_add(self.ticks).unwrap_or(self.tick)
    }

    pub fn contains(&self, tick: Fraction) -> bool {
        self.tick <= tick && tick < self.end_tick()
    }
}

/// Segment kinds in their order at equal ticks
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    HeaderClef,
    TimeSig,
    Clef,
    ChordRest,
    /// Zero-duration attachment point for spanners
    TimeTick,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub measure: MeasureKey,
    pub tick: Fraction,
    pub kind: SegmentType,
    /// Element per track
    pub elements: Vec<(TrackIndex, ElementRef)>,
}

impl Segment {
    pub fn element(&self, track: TrackIndex) -> Option<ElementRef> {
        self.elements
            .iter()
            .find(|(t, _)| *t == track)
            .map(|(_, e)| *e)
    }
}

// ============================================================================
// CHORDS, RESTS, NOTES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Auto,
    Up,
    Down,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeamMode {
    #[default]
    Auto,
    Begin,
    Mid,
    End,
    NoBeam,
    Begin16,
    Begin32,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Chord {
    pub notes: Vec<NoteKey>,
    pub stem_direction: Direction,
    /// Staff offset of a cross-staff chord
    pub staff_move: i32,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Rest {
    /// Diatonic step above middle C for a rest drawn at a fixed height
    pub fixed_line: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ChordRestKind {
    Chord(Chord),
    Rest(Rest),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChordRest {
    pub segment: SegmentKey,
    pub track: TrackIndex,
    pub duration: Duration,
    /// Actual (tuplet-scaled) length
    pub ticks: Fraction,
    pub tuplet: Option<TupletKey>,
    pub beam: Option<BeamKey>,
    pub beam_mode: BeamMode,
    pub visible: bool,
    pub kind: ChordRestKind,
}

impl ChordRest {
    pub fn is_rest(&self) -> bool {
        matches!(self.kind, ChordRestKind::Rest(_))
    }

    pub fn notes(&self) -> &[NoteKey] {
        match &self.kind {
            ChordRestKind::Chord(chord) => &chord.notes,
            ChordRestKind::Rest(_) => &[],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccidentalType {
    TripleFlat,
    DoubleFlat,
    Flat,
    Natural,
    Sharp,
    DoubleSharp,
    TripleSharp,
}

impl AccidentalType {
    pub fn from_alter(alter: i32) -> Option<Self> {
        match alter {
            -3 => Some(AccidentalType::TripleFlat),
            -2 => Some(AccidentalType::DoubleFlat),
            -1 => Some(AccidentalType::Flat),
            0 => Some(AccidentalType::Natural),
            1 => Some(AccidentalType::Sharp),
            2 => Some(AccidentalType::DoubleSharp),
            3 => Some(AccidentalType::TripleSharp),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccidentalRole {
    Auto,
    User,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accidental {
    pub kind: AccidentalType,
    pub role: AccidentalRole,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub chord: ChordRestKey,
    /// MIDI pitch
    pub pitch: u8,
    /// Tonal pitch class on the line of fifths (C = 14)
    pub tpc: i32,
    pub accidental: Option<Accidental>,
    pub tie_forward: Option<TieKey>,
    pub tie_back: Option<TieKey>,
}

// ============================================================================
// TUPLETS, CLEFS, TIME SIGNATURES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TupletNumberType {
    #[default]
    ShowNumber,
    ShowRelation,
    NoText,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TupletBracketType {
    #[default]
    AutoBracket,
    ShowBracket,
    ShowNoBracket,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TupletMember {
    ChordRest(ChordRestKey),
    Tuplet(TupletKey),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tuplet {
    pub measure: MeasureKey,
    pub track: TrackIndex,
    pub tick: Fraction,
    /// Actual over normal (3/2 for a triplet)
    pub ratio: Fraction,
    pub base_len: Duration,
    /// Local length: base length × ratio denominator
    pub ticks: Fraction,
    pub parent: Option<TupletKey>,
    pub elements: Vec<TupletMember>,
    pub visible: bool,
    pub number_type: TupletNumberType,
    pub bracket_type: TupletBracketType,
    pub autoplace: bool,
    /// Offset in spatium
    pub offset: (f64, f64),
    pub user_p1: (f64, f64),
    pub user_p2: (f64, f64),
}

impl Tuplet {
    pub fn new(measure: MeasureKey, track: TrackIndex, tick: Fraction, ratio: Fraction, base_len: Duration) -> Self {
        Self {
            measure,
            track,
            tick,
            ratio,
            base_len,
            ticks: Fraction::ZERO,
            parent: None,
            elements: Vec::new(),
            visible: true,
            number_type: TupletNumberType::default(),
            bracket_type: TupletBracketType::default(),
            autoplace: true,
            offset: (0.0, 0.0),
            user_p1: (0.0, 0.0),
            user_p2: (0.0, 0.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClefType {
    G,
    G8va,
    G8vb,
    G1,
    C1,
    C2,
    C3,
    C4,
    C5,
    F,
    F8va,
    F8vb,
    FBaritone,
    Perc,
    Perc2,
    Tab,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clef {
    pub segment: SegmentKey,
    pub track: TrackIndex,
    pub kind: ClefType,
    pub visible: bool,
    pub generated: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSig {
    pub segment: SegmentKey,
    pub track: TrackIndex,
    pub sig: TimeSignature,
}

// ============================================================================
// SPANNERS, TIES, BEAMS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpannerKind {
    Slur,
    Hairpin,
    Ottava,
    Trill,
    Vibrato,
    Pedal,
    TextLine,
    Glissando,
    GuitarBend,
    NoteLine,
    LetRing,
    PalmMute,
    GradualTempoChange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
    Segment,
    Chord,
    Note,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HairpinType {
    CrescHairpin,
    DimHairpin,
    CrescLine,
    DimLine,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OttavaType {
    Ottava8va,
    Ottava8vb,
    Ottava15ma,
    Ottava15mb,
    Ottava22ma,
    Ottava22mb,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlurStyle {
    Solid,
    Dashed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrillType {
    Trill,
    Prallprall,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VibratoType {
    GuitarVibrato,
    GuitarVibratoWide,
    VibratoSawtooth,
    VibratoSawtoothWide,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoChangeType {
    Accelerando,
    Allargando,
    Rallentando,
    Ritardando,
    Stringendo,
}

/// Type-specific spanner settings; only the fields relevant to the kind are set
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct SpannerProperties {
    pub line_style: Option<LineStyle>,
    /// Hook heights in spatium; positive points down
    pub begin_hook: Option<f64>,
    pub end_hook: Option<f64>,
    pub hairpin: Option<HairpinType>,
    pub ottava: Option<OttavaType>,
    pub slur_style: Option<SlurStyle>,
    pub direction: Direction,
    pub trill: Option<TrillType>,
    pub vibrato: Option<VibratoType>,
    pub tempo_change: Option<TempoChangeType>,
    pub begin_text: Option<String>,
    pub continue_text: Option<String>,
    pub end_text: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpannerSegmentType {
    Single,
    Begin,
    Middle,
    End,
}

/// Laid-out piece of a spanner on one system
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpannerSegment {
    pub system: usize,
    pub kind: SpannerSegmentType,
    /// Start offset in spatium
    pub offset: (f64, f64),
    /// End offset in spatium
    pub offset2: (f64, f64),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spanner {
    pub kind: SpannerKind,
    pub anchor: AnchorMode,
    pub tick: Fraction,
    pub tick2: Fraction,
    pub track: TrackIndex,
    pub track2: TrackIndex,
    pub start_element: Option<ElementRef>,
    pub end_element: Option<ElementRef>,
    pub visible: bool,
    pub properties: SpannerProperties,
    pub segments: Vec<SpannerSegment>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieKind {
    Tie,
    /// Tie that lets the note ring without an end note
    LaissezVib,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tie {
    pub start_note: NoteKey,
    pub end_note: Option<NoteKey>,
    pub kind: TieKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    pub track: TrackIndex,
    pub elements: Vec<ChordRestKey>,
}

/// Strokes of a two-chord tremolo
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TremoloType {
    C8,
    C16,
    C32,
    C64,
}

impl TremoloType {
    /// Tremolo drawn with `beams` strokes, clamped to the supported range
    pub fn from_beams(beams: u32) -> Self {
        match beams {
            0 | 1 => TremoloType::C8,
            2 => TremoloType::C16,
            3 => TremoloType::C32,
            _ => TremoloType::C64,
        }
    }
}

/// Alternation between two chords of equal length
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tremolo {
    pub kind: TremoloType,
    pub track: TrackIndex,
    pub chord1: ChordRestKey,
    pub chord2: ChordRestKey,
}

// ============================================================================
// PARTS AND STAVES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BracketType {
    Normal,
    Brace,
    Square,
    Line,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BracketItem {
    pub kind: BracketType,
    /// Number of staves covered
    pub span: usize,
    pub column: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub staves: Vec<StaffIndex>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Staff {
    pub part: usize,
    pub lines: u8,
    pub default_clef: Option<ClefType>,
    pub transposing_clef: Option<ClefType>,
    /// Barline extent in half spaces relative to the staff
    pub bar_line_from: i32,
    pub bar_line_to: i32,
    /// Barline continues to the next staff
    pub bar_line_span: bool,
    pub brackets: Vec<BracketItem>,
    pub hide_when_empty: bool,
}

impl Staff {
    pub fn new(part: usize) -> Self {
        Self {
            part,
            lines: 5,
            default_clef: None,
            transposing_clef: None,
            bar_line_from: 0,
            bar_line_to: 0,
            bar_line_span: false,
            brackets: Vec::new(),
            hide_when_empty: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tremolo_strokes_follow_hooks() {
        let strokes = |kind: DurationType| TremoloType::from_beams(kind.hooks());
        assert_eq!(strokes(DurationType::Half), TremoloType::C8);
        assert_eq!(strokes(DurationType::Eighth), TremoloType::C8);
        assert_eq!(strokes(DurationType::D16th), TremoloType::C16);
        assert_eq!(strokes(DurationType::D32nd), TremoloType::C32);
        assert_eq!(strokes(DurationType::D128th), TremoloType::C64);
    }

    #[test]
    fn test_dotted_durations() {
        let quarter = Duration::plain(DurationType::Quarter);
        assert_eq!(quarter.fraction().unwrap(), Fraction::new(1, 4).unwrap());
        let dotted = Duration::new(DurationType::Quarter, 1);
        assert_eq!(dotted.fraction().unwrap(), Fraction::new(3, 8).unwrap());
        let double = Duration::new(DurationType::Half, 2);
        assert_eq!(double.fraction().unwrap(), Fraction::new(7, 8).unwrap());
    }

    #[test]
    fn test_track_helpers() {
        assert_eq!(staff2track(2), 8);
        assert_eq!(track2staff(9), 2);
        assert_eq!(track2voice(9), 1);
    }

    #[test]
    fn test_segment_type_order() {
        assert!(SegmentType::HeaderClef < SegmentType::TimeSig);
        assert!(SegmentType::Clef < SegmentType::ChordRest);
        assert!(SegmentType::ChordRest < SegmentType::TimeTick);
    }

    #[test]
    fn test_time_signature_duration() {
        let six_eight = TimeSignature::new(6, 8);
        assert_eq!(six_eight.duration().unwrap(), Fraction::new(3, 4).unwrap());
    }
}
