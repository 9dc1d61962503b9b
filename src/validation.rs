//! A uniform decode/repair diagnostic type shared by the segment reader
//! and the symbol registry loader, per §7's "validation issues with
//! severity" taxonomy.

use std::fmt;

/// How serious a [`ValidationIssue`] is. `Critical` means the caller
/// cannot safely continue decoding; everything below that is informational
/// or a degraded-but-usable state.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A single decode/verification finding, with enough context (byte
/// offset, event index, when known) for a repair tool to act on it
/// without re-scanning from the start.
#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    /// Byte offset within the file this issue was found at, if known.
    pub offset: Option<u64>,
    /// Index of the event (0-based) this issue pertains to, if known.
    pub event_index: Option<u64>,
}

impl ValidationIssue {
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            offset: None,
            event_index: None,
        }
    }

    #[must_use]
    pub fn at_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn at_event(mut self, index: u64) -> Self {
        self.event_index = Some(index);
        self
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.severity >= Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.severity, self.message)?;
        if let Some(off) = self.offset {
            write!(f, " (offset {off})")?;
        }
        if let Some(idx) = self.event_index {
            write!(f, " (event #{idx})")?;
        }
        Ok(())
    }
}
