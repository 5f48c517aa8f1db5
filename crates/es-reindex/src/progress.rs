//! Progress display and failure aggregation.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::document::{DocumentOutcome, FailedDocument};

/// Owns the terminal progress area. One bar per active stream.
#[derive(Clone)]
pub struct ProgressTracker {
    multi: MultiProgress,
}

impl ProgressTracker {
    /// Creates a tracker drawing to stderr, or drawing nothing when `quiet`.
    pub fn new(quiet: bool) -> Self {
        let multi = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self { multi }
    }

    /// A tracker that never draws.
    pub fn hidden() -> Self {
        Self::new(true)
    }

    /// Adds a bar labelled `label`. The length is set once the total is known.
    pub fn add_bar(&self, label: &str) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(bar_style());
        bar.set_prefix(format!("{label:>7}"));
        bar
    }

    /// Whether bars are drawn at all.
    pub fn is_hidden(&self) -> bool {
        self.multi.is_hidden()
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Counts write outcomes and keeps every rejected document.
#[derive(Debug, Default, Clone)]
pub struct FailureCollector {
    processed: u64,
    failed: u64,
    failures: Vec<FailedDocument>,
}

impl FailureCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one outcome.
    pub fn record(&mut self, outcome: &DocumentOutcome) {
        self.processed += 1;
        if let Some(failure) = FailedDocument::from_outcome(outcome) {
            self.failed += 1;
            self.failures.push(failure);
        }
    }

    /// Records outcomes in order.
    pub fn record_all(&mut self, outcomes: &[DocumentOutcome]) {
        for outcome in outcomes {
            self.record(outcome);
        }
    }

    /// Outcomes seen so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Rejected documents seen so far.
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Acknowledged documents seen so far.
    pub fn succeeded(&self) -> u64 {
        self.processed - self.failed()
    }

    /// Rejected documents in the order they were reported.
    pub fn failures(&self) -> &[FailedDocument] {
        &self.failures
    }

    /// Moves the failure list out, leaving the counters intact.
    pub fn take_failures(&mut self) -> Vec<FailedDocument> {
        std::mem::take(&mut self.failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Outcome};
    use serde_json::json;

    fn outcome(id: &str, outcome: Outcome) -> DocumentOutcome {
        DocumentOutcome {
            document: Document::new("idx", Some(id.to_string()), json!({})),
            outcome,
        }
    }

    #[test]
    fn test_failure_collector_counts() {
        let mut collector = FailureCollector::new();
        collector.record_all(&[
            outcome("1", Outcome::Succeeded),
            outcome("2", Outcome::Failed("version_conflict".to_string())),
            outcome("3", Outcome::Succeeded),
        ]);

        assert_eq!(collector.processed(), 3);
        assert_eq!(collector.succeeded(), 2);
        assert_eq!(collector.failed(), 1);
        assert_eq!(collector.failures()[0].document.id.as_deref(), Some("2"));

        let taken = collector.take_failures();
        assert_eq!(taken.len(), 1);
        assert!(collector.failures().is_empty());
        assert_eq!(collector.processed(), 3);
        assert_eq!(collector.failed(), 1);
    }

    #[test]
    fn test_hidden_tracker() {
        let tracker = ProgressTracker::hidden();
        assert!(tracker.is_hidden());
        let bar = tracker.add_bar("export");
        bar.set_length(10);
        bar.inc(3);
        assert_eq!(bar.position(), 3);
    }
}
