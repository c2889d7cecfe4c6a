//! Run-scoped diagnostics collector.
//!
//! A merge run accumulates every problem it finds instead of failing on the
//! first one, so an operator sees all structural mistakes across all
//! contributions in a single pass. Errors and warnings are kept in append
//! order, never deduplicated, and discarded after being reported upward.

use tracing::{error, warn};

/// Fatal errors and informational warnings gathered during one merge run.
///
/// Any error present means the run was rejected and nothing was persisted;
/// warnings never affect the commit decision.
#[derive(Debug, Default, Clone)]
pub struct ValidationMessages {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationMessages {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        self.errors.push(message);
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// The sole signal that the run must be treated as failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
