//! Import pipeline
//!
//! Converts a [`ForeignDocument`] into a [`Score`].
//!
//! # Overview
//!
//! The import runs in four stages:
//! 1. **Skeleton**: parts, staves, brackets, measures and time signatures ([`scoremap`])
//! 2. **Entries**: every (staff, measure, layer) is rebuilt from its tuplet map
//!    and reconciled onto a track ([`tuplet_map`], [`reconciler`], [`entries`])
//! 3. **Spanners**: smart shapes are anchored to the placed entries ([`smart_shapes`])
//! 4. **Positioning**: spanner segments are laid out once and offset
//!
//! Problems below the document level never abort the import. They are
//! recorded in the returned diagnostics and the affected voice, entry or
//! spanner is skipped or filled.
//!
//! # Basic Usage
//!
//! ```
//! use score_import::{import_document, DocumentBuilder, ImportOptions};
//!
//! let doc = DocumentBuilder::new()
//!     .staff(1, "Flute")
//!     .measures(1, 4, 1024)
//!     .voice(1, 1, 0, |v| v.tuplet(3, 2, 1024, |t| t.note(1024, &[0]).note(1024, &[1]).note(1024, &[2])))
//!     .build();
//!
//! let outcome = import_document(&doc, &ImportOptions::default()).unwrap();
//! assert_eq!(outcome.score.tuplets().count(), 1);
//! assert_eq!(outcome.stats.entries.placed, 3);
//! ```

pub mod convert;
pub mod entries;
pub mod options;
pub mod reconciler;
pub mod scoremap;
pub mod smart_shapes;
pub mod tuplet_map;

pub use entries::EntryIndex;
pub use options::ImportOptions;
pub use scoremap::{EntryStats, ScoreMap};
pub use smart_shapes::ShapeStats;

use crate::diagnostics::{Diagnostics, ImportLogger};
use crate::errors::ImportResult;
use crate::score::{LayoutEngine, Score, SystemLayout};
use crate::source::{ForeignDocument, PartId, SCORE_PART_ID};
use serde::Serialize;

/// Per-part settings handed down the pipeline
#[derive(Debug, Clone, Copy)]
pub struct PartContext<'a> {
    pub part_id: PartId,
    pub options: &'a ImportOptions,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub entries: EntryStats,
    pub shapes: ShapeStats,
}

/// Result of a document import
#[derive(Debug)]
pub struct ImportOutcome {
    pub score: Score,
    pub diagnostics: Diagnostics,
    pub stats: ImportStats,
}

/// Import `doc` with the default system layout
pub fn import_document(doc: &dyn ForeignDocument, options: &ImportOptions) -> ImportResult<ImportOutcome> {
    let layout = SystemLayout::new(options.measures_per_system);
    import_document_with_layout(doc, options, &layout)
}

/// Import `doc`, positioning spanners with `layout`.
///
/// The whole import is one undo step on the returned score.
pub fn import_document_with_layout(
    doc: &dyn ForeignDocument,
    options: &ImportOptions,
    layout: &dyn LayoutEngine,
) -> ImportResult<ImportOutcome> {
    let mut logger = ImportLogger::new(options.log_level);
    let mut score = Score::new();
    let ctx = PartContext {
        part_id: SCORE_PART_ID,
        options,
    };
    let mut stats = ImportStats::default();

    score.begin_batch();

    let mut map = scoremap::import_parts(doc, &mut score, &mut logger)?;
    scoremap::import_brackets(doc, &mut score, &map, &mut logger);
    scoremap::import_measures(doc, &mut score, &mut map, &mut logger)?;
    log::debug!(
        "Skeleton: {} parts, {} staves, {} measures",
        score.parts().len(),
        score.nstaves(),
        map.measures().len()
    );

    let mut index = EntryIndex::new();
    stats.entries = scoremap::import_entries(doc, &mut score, &map, &ctx, &mut index, &mut logger)?;

    if options.import_smart_shapes {
        let (created, shape_stats) =
            smart_shapes::import_smart_shapes(doc, &mut score, &map, &index, &ctx, &mut logger);
        smart_shapes::position_spanners(&mut score, &created, layout);
        stats.shapes = shape_stats;
    }

    score.end_batch();

    let diagnostics = logger.into_diagnostics();
    log::info!(
        "Import finished: {} entries, {} spanners, {} diagnostics",
        stats.entries.placed,
        stats.shapes.created,
        diagnostics.entries.len()
    );
    Ok(ImportOutcome {
        score,
        diagnostics,
        stats,
    })
}
