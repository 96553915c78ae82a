//! Unattended reconciliation of unambiguous, exact matches

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AutoReconcileConfig;
use crate::engine::allocator::Allocator;
use crate::reconciliation::matcher::{Matcher, RankedCandidate, RankedCandidates};
use crate::traits::*;
use crate::types::*;

/// What the auto-reconciler would do with one ranking
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutoDecision<'a> {
    Accept(&'a RankedCandidate),
    NoCandidate,
    /// Best score under the threshold, or the best amount is not exact
    LowConfidence,
    /// Runner-up within epsilon of the best
    Ambiguous,
}

/// Result for one item of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AutoOutcome {
    Matched { document_id: String },
    SkippedAmbiguous,
    SkippedNoCandidate,
    SkippedLowConfidence,
    Failed { error: ErrorReport },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item_id: String,
    #[serde(flatten)]
    pub outcome: AutoOutcome,
}

/// Summary of one auto-reconcile batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoReconcileReport {
    pub account_id: String,
    pub matched: usize,
    pub skipped_ambiguous: usize,
    pub skipped_no_candidate: usize,
    pub skipped_low_confidence: usize,
    /// Items whose allocation failed for a per-item reason, e.g. `Conflict`
    pub failed: usize,
    pub outcomes: Vec<ItemOutcome>,
}

impl AutoReconcileReport {
    fn new(account_id: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            ..Self::default()
        }
    }

    /// Items left for manual review
    pub fn skipped(&self) -> usize {
        self.skipped_ambiguous + self.skipped_no_candidate + self.skipped_low_confidence
    }

    fn record(&mut self, item_id: &str, outcome: AutoOutcome) {
        match &outcome {
            AutoOutcome::Matched { .. } => self.matched += 1,
            AutoOutcome::SkippedAmbiguous => self.skipped_ambiguous += 1,
            AutoOutcome::SkippedNoCandidate => self.skipped_no_candidate += 1,
            AutoOutcome::SkippedLowConfidence => self.skipped_low_confidence += 1,
            AutoOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(ItemOutcome {
            item_id: item_id.to_string(),
            outcome,
        });
    }

    /// Record a per-item failure; infrastructure failures are handed back
    fn record_failure(&mut self, item_id: &str, error: ReconError) -> ReconResult<()> {
        if error.is_infrastructure() {
            return Err(error);
        }
        warn!(item_id = %item_id, error = %error, "auto-reconcile failed for item");
        self.record(
            item_id,
            AutoOutcome::Failed {
                error: ErrorReport::from(&error),
            },
        );
        Ok(())
    }
}

pub struct AutoReconciler {
    config: AutoReconcileConfig,
}

impl AutoReconciler {
    pub fn new(config: AutoReconcileConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AutoReconcileConfig {
        &self.config
    }

    /// Accept only an exact, confident and clearly leading best candidate
    pub fn decide<'a>(&self, candidates: &'a RankedCandidates) -> AutoDecision<'a> {
        let Some(best) = candidates.best() else {
            return AutoDecision::NoCandidate;
        };

        if best.score < self.config.accept_threshold || !best.exact_amount {
            return AutoDecision::LowConfidence;
        }

        if let Some(runner_up) = candidates.runner_up() {
            if best.score - runner_up.score < self.config.ambiguity_epsilon {
                return AutoDecision::Ambiguous;
            }
        }

        AutoDecision::Accept(best)
    }

    /// Process every unreconciled item of `account_id` in date order.
    ///
    /// Per-item problems are recorded in the report and the batch continues;
    /// only `ProviderUnavailable` stops it early and is returned as an error.
    pub async fn run<S: LedgerSnapshotProvider>(
        &self,
        matcher: &Matcher,
        allocator: &mut Allocator<S>,
        account_id: &str,
    ) -> ReconResult<AutoReconcileReport> {
        let mut report = AutoReconcileReport::new(account_id);

        let items: Vec<ReconcilableItem> = allocator
            .storage
            .list_items(Some(account_id))
            .await?
            .into_iter()
            .filter(ReconcilableItem::is_unreconciled)
            .collect();

        for listed in items {
            // Earlier allocations in this batch may have changed the item
            let item = match allocator.get_item_required(&listed.id).await {
                Ok(item) if item.is_unreconciled() => item,
                Ok(_) => continue,
                Err(error) => {
                    report.record_failure(&listed.id, error)?;
                    continue;
                }
            };

            // Untruncated, so a tie just past `max_candidates` still counts
            let candidates = match matcher.suggest_all(&allocator.storage, &item).await {
                Ok(candidates) => candidates,
                Err(error) => {
                    report.record_failure(&item.id, error)?;
                    continue;
                }
            };

            let outcome = match self.decide(&candidates) {
                AutoDecision::NoCandidate => AutoOutcome::SkippedNoCandidate,
                AutoDecision::LowConfidence => AutoOutcome::SkippedLowConfidence,
                AutoDecision::Ambiguous => AutoOutcome::SkippedAmbiguous,
                AutoDecision::Accept(best) => {
                    let line = best.allocation_line(item.amount_unallocated());
                    match allocator.apply(&item.id, vec![line]).await {
                        Ok(_) => AutoOutcome::Matched {
                            document_id: best.document_id.clone(),
                        },
                        Err(error) => {
                            report.record_failure(&item.id, error)?;
                            continue;
                        }
                    }
                }
            };
            report.record(&item.id, outcome);
        }

        info!(
            account_id = %account_id,
            matched = report.matched,
            skipped = report.skipped(),
            failed = report.failed,
            "auto-reconcile finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::{Currency, Money};
    use chrono::NaiveDate;

    fn candidate(id: &str, score: f64, exact: bool) -> RankedCandidate {
        let eur = Currency::new("EUR").unwrap();
        RankedCandidate {
            document_id: id.to_string(),
            document_kind: DocumentKind::Invoice,
            counterparty_id: "c".to_string(),
            amount_due: Money::new(100, eur),
            due_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            document_version: 0,
            score,
            breakdown: crate::reconciliation::matcher::ScoreBreakdown {
                amount: if exact { 1.0 } else { 0.5 },
                counterparty: 1.0,
                date: 1.0,
            },
            exact_amount: exact,
        }
    }

    fn ranked(candidates: Vec<RankedCandidate>) -> RankedCandidates {
        serde_json::from_value(serde_json::to_value(candidates).unwrap()).unwrap()
    }

    #[test]
    fn test_decisions() {
        let auto = AutoReconciler::new(AutoReconcileConfig::default());

        assert_eq!(auto.decide(&RankedCandidates::default()), AutoDecision::NoCandidate);

        let low = ranked(vec![candidate("A", 0.90, true)]);
        assert_eq!(auto.decide(&low), AutoDecision::LowConfidence);

        let inexact = ranked(vec![candidate("A", 0.95, false)]);
        assert_eq!(auto.decide(&inexact), AutoDecision::LowConfidence);

        let tied = ranked(vec![candidate("A", 0.95, true), candidate("B", 0.94, true)]);
        assert_eq!(auto.decide(&tied), AutoDecision::Ambiguous);

        let clear = ranked(vec![candidate("A", 0.95, true), candidate("B", 0.60, true)]);
        match auto.decide(&clear) {
            AutoDecision::Accept(best) => assert_eq!(best.document_id, "A"),
            other => panic!("expected accept, got {other:?}"),
        }
    }

    #[test]
    fn test_report_counts() {
        let mut report = AutoReconcileReport::new("bank");
        report.record("a", AutoOutcome::SkippedAmbiguous);
        report.record("b", AutoOutcome::SkippedNoCandidate);
        report.record(
            "c",
            AutoOutcome::Matched {
                document_id: "inv".to_string(),
            },
        );
        assert_eq!(report.matched, 1);
        assert_eq!(report.skipped(), 2);

        let outage = ReconError::ProviderUnavailable("down".to_string());
        assert!(report.record_failure("d", outage).is_err());
        report
            .record_failure("e", ReconError::Conflict("raced".to_string()))
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.outcomes.len(), 4);
    }

    #[test]
    fn test_outcome_wire_format() {
        let outcome = ItemOutcome {
            item_id: "tx1".to_string(),
            outcome: AutoOutcome::Matched {
                document_id: "inv1".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"item_id": "tx1", "outcome": "matched", "document_id": "inv1"})
        );
    }

    #[test]
    fn test_thresholds_come_from_config() {
        let lenient = AutoReconciler::new(AutoReconcileConfig {
            accept_threshold: 0.5,
            ambiguity_epsilon: 0.0,
        });
        let strict = AutoReconciler::new(AutoReconcileConfig::default());

        let modest = ranked(vec![candidate("A", 0.6, true)]);
        assert!(matches!(lenient.decide(&modest), AutoDecision::Accept(_)));
        assert_eq!(strict.decide(&modest), AutoDecision::LowConfidence);

        let tied = ranked(vec![candidate("A", 0.95, true), candidate("B", 0.95, true)]);
        assert!(matches!(lenient.decide(&tied), AutoDecision::Accept(_)));
        assert_eq!(strict.decide(&tied), AutoDecision::Ambiguous);
    }
}
