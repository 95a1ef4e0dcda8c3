//! Error types for the import pipeline.
//!
//! Only [`ImportError`] aborts a document import. The other enums describe
//! failures that stay inside one voice, one entry or one spanner and are
//! reported through the diagnostics log by the caller.

use crate::fraction::Fraction;
use crate::source::{EntryNumber, MeasureId, ShapeId, StaffId};
use thiserror::Error;

/// Rational arithmetic failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("fraction component exceeds the safe range")]
    Overflow,

    #[error("fraction with zero denominator")]
    ZeroDenominator,
}

/// Failure while placing one source entry
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EntryError {
    /// Start or duration could not be computed; the rest of the voice is abandoned.
    #[error("entry {entry}: position or duration cannot be computed")]
    PositionUnknown { entry: EntryNumber },

    #[error("entry {entry}: cursor is at {found} but the entry starts at {expected}")]
    IncorrectPosition {
        entry: EntryNumber,
        expected: Fraction,
        found: Fraction,
    },

    /// The span was filled with invisible rests instead.
    #[error("entry {entry}: duration has no destination equivalent")]
    UnsupportedDuration { entry: EntryNumber },

    #[error("cannot fill a gap of negative length {length}")]
    NegativeGap { length: Fraction },

    #[error("no segment can be acquired at tick {tick}")]
    MissingSegment { tick: Fraction },

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

/// Failure while resolving one smart shape
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpannerError {
    #[error("shape {shape}: {end} endpoint could not be resolved")]
    UnresolvedEndpoint { shape: ShapeId, end: &'static str },

    #[error("shape {shape}: {detail}")]
    InvalidAnchor { shape: ShapeId, detail: &'static str },

    #[error("shape {shape}: custom line {line} is not defined")]
    MissingCustomLine { shape: ShapeId, line: u32 },

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

/// Destination document mutation failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("measure must start at {expected}, got {found}")]
    MeasureNotContiguous { expected: Fraction, found: Fraction },

    #[error("no measure contains tick {tick}")]
    NoMeasureAt { tick: Fraction },

    #[error("tick {tick} lies outside the measure")]
    TickOutsideMeasure { tick: Fraction },

    #[error("stale {0} handle")]
    StaleHandle(&'static str),

    #[error("track {track} already holds a chord or rest at tick {tick}")]
    TrackOccupied { track: usize, tick: Fraction },

    #[error("element cannot be added to this parent")]
    InvalidParent,

    #[error("no staff with index {0}")]
    NoSuchStaff(usize),
}

/// Document-level import failure
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("document has no measures")]
    NoMeasures,

    #[error("document has no staves")]
    NoStaves,

    #[error("staff {0} is referenced but not defined")]
    MissingStaff(StaffId),

    #[error("measure {0} has no usable time signature")]
    MissingMeasure(MeasureId),

    #[error("invalid document JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read document: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

pub type ImportResult<T> = Result<T, ImportError>;
