//! Music document import pipeline
//!
//! Converts an entry/duration oriented document (notes, rests and nested
//! tuplets keyed by elapsed time per staff, layer and measure) into a
//! linear score addressed by absolute ticks and segments.
//!
//! - [`source`]: the foreign document model and its accessor trait
//! - [`score`]: the destination score arena
//! - [`import`]: the pipeline itself
//! - [`diagnostics`]: the import log returned alongside the score

pub mod diagnostics;
pub mod errors;
pub mod fraction;
pub mod import;
pub mod score;
pub mod source;

// Re-export commonly used types
pub use diagnostics::{Diagnostic, DiagnosticSeverity, Diagnostics};
pub use errors::{ArithmeticError, EntryError, ImportError, ImportResult, ScoreError, SpannerError};
pub use fraction::{Fraction, TICKS_PER_WHOLE};
pub use import::{import_document, import_document_with_layout, ImportOptions, ImportOutcome};
pub use score::Score;
pub use source::{DocumentBuilder, ForeignDocument, MemoryDocument};
