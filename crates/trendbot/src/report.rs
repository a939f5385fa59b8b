//! End-of-batch summary.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};
use trendbot_core::{RequestId, Symbol};
use trendbot_executor::DispatchReport;
use trendbot_position::ReconcileOutcome;
use trendbot_signal::SignalEvaluation;

/// Signal derived for one catalog instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalRecord {
    pub symbol: Symbol,
    pub req_id: RequestId,
    pub evaluation: SignalEvaluation,
}

/// Everything one batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Requests that had not completed when the wait ended.
    pub timed_out: Vec<RequestId>,
    /// One record per catalog instrument, in catalog order.
    pub signals: Vec<SignalRecord>,
    pub reconcile: ReconcileOutcome,
    pub dispatch: DispatchReport,
    /// Ownership after the settle period.
    pub final_ownership: BTreeMap<Symbol, bool>,
}

impl BatchReport {
    /// Whether every series completed before the deadline.
    pub fn completed(&self) -> bool {
        self.timed_out.is_empty()
    }

    pub fn signal_for(&self, symbol: &str) -> Option<&SignalRecord> {
        self.signals.iter().find(|r| r.symbol.as_str() == symbol)
    }

    /// Log the summary: one line per instrument, then totals.
    pub fn log_summary(&self) {
        for record in &self.signals {
            let owned = self
                .final_ownership
                .get(&record.symbol)
                .copied()
                .unwrap_or(false);
            info!(
                symbol = %record.symbol,
                signal = %record.evaluation.signal,
                insufficient = record.evaluation.is_insufficient(),
                owned,
                "Batch result"
            );
        }

        if !self.completed() {
            warn!(missing = ?self.timed_out, "Batch ran degraded after timeout");
        }

        info!(
            decisions = self.reconcile.decisions.len(),
            skipped = self.reconcile.skipped.len(),
            submitted = self.dispatch.submitted_count(),
            failed = self.dispatch.failed_count(),
            "Batch summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trendbot_core::Signal;
    use trendbot_signal::Insufficiency;

    #[test]
    fn test_completed_and_lookup() {
        let mut report = BatchReport::default();
        assert!(report.completed());

        report.timed_out.push(RequestId::new(3));
        report.signals.push(SignalRecord {
            symbol: Symbol::new("C").unwrap(),
            req_id: RequestId::new(3),
            evaluation: SignalEvaluation::insufficient(Insufficiency::NotCompleted, None),
        });

        assert!(!report.completed());
        let record = report.signal_for("C").unwrap();
        assert_eq!(record.evaluation.signal, Signal::Flat);
        assert!(report.signal_for("Z").is_none());
    }

    #[test]
    fn test_serializes_to_json() {
        let report = BatchReport::default();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"timed_out\":[]"));
        assert!(json.contains("\"final_ownership\":{}"));
    }
}
