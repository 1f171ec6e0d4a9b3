// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all middle-end passes.
// Diagnostics are anchored on process Ids rather than source spans: the
// network arrives already built, so the process is the finest location a
// finding can point at.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::id::Id;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0100`, `N0300`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    /// Network description is malformed (bad kind, bad payload).
    pub const E0100: DiagCode = DiagCode("E0100");
    /// Network description references an unknown process or port.
    pub const E0101: DiagCode = DiagCode("E0101");
    /// Process port arity does not match its kind.
    pub const E0200: DiagCode = DiagCode("E0200");
    /// Composite process left in a network that must be flat.
    pub const E0201: DiagCode = DiagCode("E0201");
    /// Boundary port is connected or aliases a non-leaf port.
    pub const E0202: DiagCode = DiagCode("E0202");
    /// Feedback cycle that does not pass through a Delay.
    pub const E0400: DiagCode = DiagCode("E0400");
    /// Feedback cycle that passes through more than one Delay.
    pub const E0401: DiagCode = DiagCode("E0401");
    /// Schedule verification failed.
    pub const E0602: DiagCode = DiagCode("E0602");
    /// Internal-consistency error raised during graph surgery.
    pub const E0900: DiagCode = DiagCode("E0900");
    /// Contained section is not data-parallel.
    pub const N0300: DiagCode = DiagCode("N0300");
    /// ParallelMap chain cannot be coalesced.
    pub const N0301: DiagCode = DiagCode("N0301");
    /// Process is unreachable from every graph output and was not scheduled.
    pub const W0401: DiagCode = DiagCode("W0401");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
    /// An expected negative outcome (candidate skipped), never a failure.
    Note,
}

// ── Related process ──────────────────────────────────────────────────────

/// A secondary process providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedProcess {
    pub process: Id,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any pass.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub subject: Option<Id>,
    pub message: String,
    pub hint: Option<String>,
    pub related: Vec<RelatedProcess>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or related processes.
    pub fn new(level: DiagLevel, subject: Option<Id>, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            subject,
            message: message.into(),
            hint: None,
            related: Vec::new(),
        }
    }

    pub fn error(subject: Option<Id>, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, subject, message)
    }

    pub fn warning(subject: Option<Id>, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, subject, message)
    }

    pub fn note(subject: Option<Id>, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Note, subject, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related process.
    pub fn with_related(mut self, process: Id, label: impl Into<String>) -> Self {
        self.related.push(RelatedProcess {
            process,
            label: label.into(),
        });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
            DiagLevel::Note => "note",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(subject) = &self.subject {
            write!(f, " (at '{}')", subject)?;
        }
        for rel in &self.related {
            write!(f, "\n  related '{}': {}", rel.process, rel.label)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// True if any diagnostic is error-level.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.level == DiagLevel::Error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_code() {
        let d = Diagnostic::error(None, "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code_and_subject() {
        let d = Diagnostic::note(Some(Id::new("zip0")), "section not data-parallel")
            .with_code(codes::N0300);
        assert_eq!(
            format!("{d}"),
            "note[N0300]: section not data-parallel (at 'zip0')"
        );
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::error(Some(Id::new("a")), "cycle without delay")
            .with_code(codes::E0400)
            .with_hint("insert a Delay on the feedback edge")
            .with_related(Id::new("b"), "cycle passes through here");

        assert_eq!(d.code, Some(codes::E0400));
        assert_eq!(
            d.hint.as_deref(),
            Some("insert a Delay on the feedback edge")
        );
        assert_eq!(d.related.len(), 1);
        assert!(has_errors(&[d]));
    }

    #[test]
    fn notes_are_not_errors() {
        let d = Diagnostic::note(None, "skipped");
        assert!(!has_errors(&[d]));
    }
}
