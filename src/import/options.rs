//! Import configuration

use crate::diagnostics::DiagnosticSeverity;
use crate::errors::ImportError;
use serde::{Deserialize, Serialize};

/// Switches for the optional import stages
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ImportOptions {
    /// Lowest severity retained in the returned diagnostics
    pub log_level: DiagnosticSeverity,
    pub import_beams: bool,
    pub import_ties: bool,
    pub import_smart_shapes: bool,
    /// Give every measure of every staff a voice 1, using a full-measure rest
    pub ensure_voice_one: bool,
    /// Fill the tail of each voice with invisible rests
    pub fill_trailing_gaps: bool,
    /// Used by the default system layout when positioning spanners
    pub measures_per_system: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            log_level: DiagnosticSeverity::Info,
            import_beams: true,
            import_ties: true,
            import_smart_shapes: true,
            ensure_voice_one: true,
            fill_trailing_gaps: true,
            measures_per_system: 4,
        }
    }
}

impl ImportOptions {
    pub fn from_json(json: &str) -> Result<Self, ImportError> {
        Ok(serde_json::from_str(json)?)
    }
}
