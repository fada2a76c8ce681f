//! # Baseline Auditing
//!
//! Correctness checks that gate publication of a candidate baseline.
//!
//! ```text
//! candidate ──audit ok──────→ published
//!     └──────audit failed───→ discarded (previous baseline keeps serving)
//! ```
//!
//! Auditors never mutate the baseline they inspect. I/O trouble is returned
//! as `Err`; correctness findings are recorded as diagnostics on the
//! [`AuditReport`] so that every auditor gets to run and the operator sees
//! all problems at once.

mod numbers;
mod reversive;
#[cfg(test)]
mod tests;

pub use numbers::NumbersAuditor;
pub use reversive::ReversiveAuditor;

use crate::domain::baseline::Baseline;
use crate::domain::errors::IndexError;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Diagnostics kept per report; the rest are only counted.
pub const MAX_DIAGNOSTICS: usize = 64;

/// A single correctness check over a baseline.
pub trait Auditor: Send + Sync {
    /// Short name used as the diagnostic prefix.
    fn name(&self) -> &'static str;

    /// Inspect `baseline`, recording findings on `report`.
    fn audit(&self, baseline: &Baseline, report: &mut AuditReport) -> Result<(), IndexError>;
}

/// Explicit switches for an audit pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditOptions {
    /// Skip every check. For controlled performance runs only.
    #[serde(default)]
    pub skip: bool,
}

impl AuditOptions {
    pub fn skipping() -> Self {
        Self { skip: true }
    }
}

/// Outcome of an audit pass.
#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    /// Problems found, prefixed with the auditor name.
    pub diagnostics: Vec<String>,
    /// Diagnostics dropped after [`MAX_DIAGNOSTICS`].
    pub suppressed: u64,
    /// Per-record checks performed.
    pub records_checked: u64,
    /// Whether the pass was skipped by [`AuditOptions::skip`].
    pub skipped: bool,
    pub duration_ms: u64,
}

impl AuditReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn passed(&self) -> bool {
        self.diagnostics.is_empty() && self.suppressed == 0
    }

    /// Record a problem found by `auditor`.
    pub fn fail(&mut self, auditor: &str, message: impl AsRef<str>) {
        if self.diagnostics.len() < MAX_DIAGNOSTICS {
            self.diagnostics
                .push(format!("{}: {}", auditor, message.as_ref()));
        } else {
            self.suppressed += 1;
        }
    }

    /// Count one per-record check.
    pub fn checked(&mut self) {
        self.records_checked += 1;
    }

    fn into_failure(self) -> IndexError {
        let mut diagnostics = self.diagnostics;
        if self.suppressed > 0 {
            diagnostics.push(format!("... and {} more", self.suppressed));
        }
        IndexError::AuditFailure { diagnostics }
    }
}

/// Ordered registry of auditors run as one pass.
pub struct CompositeAuditor {
    auditors: Vec<Box<dyn Auditor>>,
}

impl Default for CompositeAuditor {
    /// Numeric range checks first, then order and reversibility.
    fn default() -> Self {
        Self::with_auditors(vec![Box::new(NumbersAuditor), Box::new(ReversiveAuditor)])
    }
}

impl CompositeAuditor {
    pub fn with_auditors(auditors: Vec<Box<dyn Auditor>>) -> Self {
        Self { auditors }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.auditors.iter().map(|a| a.name()).collect()
    }

    /// Run every auditor against `baseline`.
    ///
    /// # Errors
    ///
    /// `AuditFailure` carrying all diagnostics if any auditor found a
    /// problem; `Io` if the baseline could not be read.
    pub fn audit(
        &self,
        baseline: &Baseline,
        options: &AuditOptions,
    ) -> Result<AuditReport, IndexError> {
        let start = Instant::now();
        let mut report = AuditReport::new();

        if options.skip {
            report.skipped = true;
            report.duration_ms = start.elapsed().as_millis() as u64;
            tracing::warn!(
                version = baseline.version(),
                duration_ms = report.duration_ms,
                "[ray-index] #audit(): skipped by explicit audit options"
            );
            return Ok(report);
        }

        for auditor in &self.auditors {
            auditor.audit(baseline, &mut report)?;
        }
        report.duration_ms = start.elapsed().as_millis() as u64;

        if report.passed() {
            tracing::info!(
                version = baseline.version(),
                records = report.records_checked,
                duration_ms = report.duration_ms,
                "[ray-index] #audit(): passed"
            );
            Ok(report)
        } else {
            tracing::warn!(
                version = baseline.version(),
                problems = report.diagnostics.len() as u64 + report.suppressed,
                duration_ms = report.duration_ms,
                "[ray-index] #audit(): rejected"
            );
            Err(report.into_failure())
        }
    }
}
