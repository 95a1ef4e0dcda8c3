//! Diagnostics collected during an import
//!
//! Every recoverable condition (skipped entry, filler rests, dropped spanner,
//! corrupted tuplet) is reported here. Messages are forwarded to the `log`
//! facade and kept as an audit trail that callers can inspect or serialize.

use crate::source::{MeasureId, StaffId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level for diagnostics
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl DiagnosticSeverity {
    fn log_level(self) -> log::Level {
        match self {
            DiagnosticSeverity::Debug => log::Level::Debug,
            DiagnosticSeverity::Info => log::Level::Info,
            DiagnosticSeverity::Warning => log::Level::Warn,
            DiagnosticSeverity::Error => log::Level::Error,
        }
    }
}

/// Where in the source document a diagnostic applies
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub staff: Option<StaffId>,
    pub measure: Option<MeasureId>,
}

impl SourceLocation {
    pub fn new(staff: StaffId, measure: MeasureId) -> Self {
        Self {
            staff: Some(staff),
            measure: Some(measure),
        }
    }

    pub fn staff(staff: StaffId) -> Self {
        Self {
            staff: Some(staff),
            measure: None,
        }
    }

    pub fn measure(measure: MeasureId) -> Self {
        Self {
            staff: None,
            measure: Some(measure),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.staff, self.measure) {
            (Some(s), Some(m)) => write!(f, "[staff {} m{}] ", s, m),
            (Some(s), None) => write!(f, "[staff {}] ", s),
            (None, Some(m)) => write!(f, "[m{}] ", m),
            (None, None) => Ok(()),
        }
    }
}

/// One recorded import event
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    /// Kind identifier (e.g., "grace_skipped", "spanner_dropped")
    pub kind: String,
    pub location: SourceLocation,
    /// Human-readable message
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.location, self.message)
    }
}

/// Collection of diagnostics for an entire import
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Diagnostics {
    pub entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.entries.extend(diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Diagnostics of the given kind
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    pub fn count(&self, severity: DiagnosticSeverity) -> usize {
        self.entries.iter().filter(|d| d.severity == severity).count()
    }
}

/// Leveled sink used by every import stage.
///
/// Messages below `min_severity` still reach the `log` facade but are not
/// retained.
#[derive(Debug)]
pub struct ImportLogger {
    min_severity: DiagnosticSeverity,
    diagnostics: Diagnostics,
}

impl ImportLogger {
    pub fn new(min_severity: DiagnosticSeverity) -> Self {
        Self {
            min_severity,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn record(
        &mut self,
        severity: DiagnosticSeverity,
        location: SourceLocation,
        kind: &str,
        message: impl Into<String>,
    ) {
        let diagnostic = Diagnostic {
            severity,
            kind: kind.to_string(),
            location,
            message: message.into(),
        };
        log::log!(severity.log_level(), "{}", diagnostic);
        if severity >= self.min_severity {
            self.diagnostics.add(diagnostic);
        }
    }

    pub fn warn(&mut self, location: SourceLocation, kind: &str, message: impl Into<String>) {
        self.record(DiagnosticSeverity::Warning, location, kind, message);
    }

    pub fn info(&mut self, location: SourceLocation, kind: &str, message: impl Into<String>) {
        self.record(DiagnosticSeverity::Info, location, kind, message);
    }

    pub fn debug(&mut self, location: SourceLocation, kind: &str, message: impl Into<String>) {
        self.record(DiagnosticSeverity::Debug, location, kind, message);
    }

    pub fn error(&mut self, location: SourceLocation, kind: &str, message: impl Into<String>) {
        self.record(DiagnosticSeverity::Error, location, kind, message);
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }
}

impl Default for ImportLogger {
    fn default() -> Self {
        Self::new(DiagnosticSeverity::Info)
    }
}
