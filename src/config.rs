//! Per-document configuration
//!
//! Every `Document` owns its own `Configuration`; there is no process-wide
//! state. Long-running walks poll a `CancelFlag` between object-level steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How strictly the validator and parser treat deviations from ISO 32000-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Any deviation from the specification fails.
    Strict,
    /// Widely-seen violations are accepted and logged.
    #[default]
    Relaxed,
    /// Validation is skipped entirely.
    None,
}

/// Which xref form the writer emits on a full rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XRefOutput {
    /// Classic `xref` section with 20-byte entries.
    #[default]
    Section,
    /// Cross-reference stream (PDF 1.5+).
    Stream,
}

/// Configuration carried by a document context.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub validation: ValidationMode,
    pub xref_output: XRefOutput,
    /// Re-compress stream content on write even when the pipeline is unchanged.
    pub force_reencode: bool,
    /// Candidate user password (byte string, truncated to 32 bytes on use).
    pub user_password: Vec<u8>,
    /// Candidate owner password (byte string, truncated to 32 bytes on use).
    pub owner_password: Vec<u8>,
    /// Unix timestamp used for Info dates and file-ID regeneration instead
    /// of the wall clock; tests pin this for byte-identical rewrites.
    pub pinned_timestamp: Option<i64>,
}

impl Configuration {
    pub fn strict() -> Self {
        Self {
            validation: ValidationMode::Strict,
            ..Default::default()
        }
    }

    pub fn with_passwords(mut self, user: &[u8], owner: &[u8]) -> Self {
        self.user_password = user.to_vec();
        self.owner_password = owner.to_vec();
        self
    }
}

/// Cooperative cancellation signal checked between object-level steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::Relaxed)
    }

    /// Convenience for `operation_cancelled` checks inside long walks.
    pub fn check(&self) -> crate::error::Result<()> {
        if self.is_cancelled() {
            Err(crate::error::PdfError::OperationCancelled)
        } else {
            Ok(())
        }
    }
}
