//! Candidate ranking for one unreconciled item

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::config::MatchingConfig;
use crate::money::Money;
use crate::reconciliation::scoring::{amount_score, date_score, FuzzyNameScorer};
use crate::traits::*;
use crate::types::*;

/// Per-signal scores of one candidate, each in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub amount: f64,
    pub counterparty: f64,
    pub date: f64,
}

/// One suggested document for an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub document_id: String,
    pub document_kind: DocumentKind,
    pub counterparty_id: String,
    pub amount_due: Money,
    pub due_date: NaiveDate,
    /// Document version the score was computed from
    pub document_version: u64,
    /// Weighted combination of the breakdown, in [0, 1]
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    /// `amount_due` equals the item's unallocated amount
    pub exact_amount: bool,
}

impl RankedCandidate {
    /// Allocation line for `amount`, pinned to the scored document version
    pub fn allocation_line(&self, amount: Money) -> AllocationLine {
        AllocationLine::new(self.document_id.clone(), amount)
            .with_expected_version(self.document_version)
    }
}

/// Candidates in rank order. Iterating does not consume the ranking, so it can
/// be walked any number of times.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankedCandidates {
    candidates: Vec<RankedCandidate>,
}

impl RankedCandidates {
    pub fn iter(&self) -> std::slice::Iter<'_, RankedCandidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn best(&self) -> Option<&RankedCandidate> {
        self.candidates.first()
    }

    pub fn runner_up(&self) -> Option<&RankedCandidate> {
        self.candidates.get(1)
    }

    pub fn into_vec(self) -> Vec<RankedCandidate> {
        self.candidates
    }
}

impl<'a> IntoIterator for &'a RankedCandidates {
    type Item = &'a RankedCandidate;
    type IntoIter = std::slice::Iter<'a, RankedCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

/// Score descending, then soonest due date, then lowest document id
fn rank_order(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.due_date.cmp(&b.due_date))
        .then_with(|| a.document_id.cmp(&b.document_id))
}

/// Ranks open documents against an item
pub struct Matcher {
    config: MatchingConfig,
    scorer: Box<dyn CounterpartyScorer>,
}

impl Matcher {
    /// Create a matcher with the default fuzzy counterparty scorer
    pub fn new(config: MatchingConfig) -> Self {
        let scorer = FuzzyNameScorer::from_config(&config);
        Self {
            config,
            scorer: Box::new(scorer),
        }
    }

    /// Create a matcher with a custom counterparty scorer
    pub fn with_scorer(config: MatchingConfig, scorer: Box<dyn CounterpartyScorer>) -> Self {
        Self { config, scorer }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Whether `document` belongs in the candidate pool for `item`
    pub fn is_eligible(&self, item: &ReconcilableItem, document: &OpenDocument) -> bool {
        if !document.is_open() || document.currency() != item.currency() {
            return false;
        }
        if self.config.match_direction && document.kind.settled_by() != item.direction() {
            return false;
        }
        if self.config.restrict_to_counterparty {
            if let Some(counterparty_id) = &item.counterparty_id {
                return &document.counterparty_id == counterparty_id;
            }
        }
        true
    }

    /// Score one document against an item
    pub fn score(&self, item: &ReconcilableItem, document: &OpenDocument) -> ScoreBreakdown {
        let amount = amount_score(
            &item.amount_unallocated(),
            &document.amount_due(),
            self.config.amount_tolerance,
        );

        let linked = item.counterparty_id.as_deref() == Some(document.counterparty_id.as_str());
        let counterparty = if linked {
            1.0
        } else {
            let raw = self
                .scorer
                .score(&item.description, &document.counterparty_name);
            if raw.is_finite() {
                raw.clamp(0.0, 1.0)
            } else {
                0.0
            }
        };

        let date = date_score(item.date, document.due_date, self.config.date_window_days);

        ScoreBreakdown {
            amount,
            counterparty,
            date,
        }
    }

    /// Rank a pool of documents, truncated to `max_candidates`. Pure: the
    /// same inputs always give the same ranking.
    pub fn rank(
        &self,
        item: &ReconcilableItem,
        documents: impl IntoIterator<Item = OpenDocument>,
    ) -> RankedCandidates {
        self.truncate(self.rank_all(item, documents))
    }

    /// Rank a pool of documents without applying `max_candidates`
    pub fn rank_all(
        &self,
        item: &ReconcilableItem,
        documents: impl IntoIterator<Item = OpenDocument>,
    ) -> RankedCandidates {
        if item.is_fully_allocated() {
            return RankedCandidates::default();
        }

        let weights = &self.config.weights;
        let unallocated = item.amount_unallocated();

        let mut candidates: Vec<RankedCandidate> = documents
            .into_iter()
            .filter(|document| self.is_eligible(item, document))
            .filter_map(|document| {
                let breakdown = self.score(item, &document);
                let score = weights.amount * breakdown.amount
                    + weights.counterparty * breakdown.counterparty
                    + weights.date * breakdown.date;
                if score <= 0.0 {
                    return None;
                }
                let amount_due = document.amount_due();
                Some(RankedCandidate {
                    exact_amount: amount_due == unallocated,
                    document_id: document.id,
                    document_kind: document.kind,
                    counterparty_id: document.counterparty_id,
                    amount_due,
                    due_date: document.due_date,
                    document_version: document.version,
                    score: score.clamp(0.0, 1.0),
                    breakdown,
                })
            })
            .collect();

        candidates.sort_by(rank_order);
        RankedCandidates { candidates }
    }

    fn truncate(&self, mut ranked: RankedCandidates) -> RankedCandidates {
        if let Some(max) = self.config.max_candidates {
            ranked.candidates.truncate(max);
        }
        ranked
    }

    /// Read the current open pool for `item` and rank it, truncated to
    /// `max_candidates`
    pub async fn suggest<S: LedgerSnapshotProvider>(
        &self,
        storage: &S,
        item: &ReconcilableItem,
    ) -> ReconResult<RankedCandidates> {
        Ok(self.truncate(self.suggest_all(storage, item).await?))
    }

    /// Like [`Matcher::suggest`] but keeps every candidate, so near-ties
    /// beyond the display limit stay visible
    pub async fn suggest_all<S: LedgerSnapshotProvider>(
        &self,
        storage: &S,
        item: &ReconcilableItem,
    ) -> ReconResult<RankedCandidates> {
        if item.is_fully_allocated() {
            return Ok(RankedCandidates::default());
        }

        let counterparty_filter = if self.config.restrict_to_counterparty {
            item.counterparty_id.as_deref()
        } else {
            None
        };
        let pool = storage
            .list_open_documents(item.currency(), counterparty_filter)
            .await?;
        let pool_size = pool.len();

        let ranked = self.rank_all(item, pool);
        debug!(
            item_id = %item.id,
            pool_size,
            candidates = ranked.len(),
            best_score = ?ranked.best().map(|c| c.score),
            "ranked match candidates"
        );
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::lifecycle::ItemState;
    use crate::money::Currency;

    fn eur(minor: i64) -> Money {
        Money::new(minor, Currency::new("EUR").unwrap())
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn item(amount: i64, description: &str) -> ReconcilableItem {
        let mut item = ReconcilableItem::new(NewItem::bank_transaction(
            "tx1",
            "bank",
            today(),
            eur(amount),
            description,
        ));
        item.state = ItemState::Confirmed;
        item
    }

    fn invoice(id: &str, counterparty: &str, name: &str, due: i64, days: i64) -> OpenDocument {
        OpenDocument::new(
            id,
            DocumentKind::Invoice,
            counterparty,
            name,
            eur(due),
            today() + chrono::Duration::days(days),
        )
    }

    #[test]
    fn test_counterparty_breaks_amount_tie() {
        let matcher = Matcher::new(MatchingConfig::default());
        let item = item(50_000, "Transfer ACME Corp invoice 17");
        let ranked = matcher.rank(
            &item,
            vec![
                invoice("B", "globex", "Globex", 50_000, 60),
                invoice("A", "acme", "ACME Corp", 50_000, 0),
            ],
        );

        let ids: Vec<&str> = ranked.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert!(ranked.best().unwrap().exact_amount);
        assert_eq!(ranked.best().unwrap().breakdown.amount, 1.0);
    }

    #[test]
    fn test_linked_counterparty_scores_full_credit() {
        let matcher = Matcher::new(MatchingConfig::default());
        let mut item = item(10_000, "no useful text");
        item.counterparty_id = Some("acme".to_string());
        let doc = invoice("A", "acme", "ACME", 10_000, 0);

        let breakdown = matcher.score(&item, &doc);
        assert_eq!(breakdown.counterparty, 1.0);
        let ranked = matcher.rank(&item, vec![doc]);
        assert!((ranked.best().unwrap().score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_linked_counterparty_restricts_pool() {
        let matcher = Matcher::new(MatchingConfig::default());
        let mut item = item(10_000, "");
        item.counterparty_id = Some("acme".to_string());
        let ranked = matcher.rank(&item, vec![invoice("B", "globex", "Globex", 10_000, 0)]);
        assert!(ranked.is_empty());

        let open = Matcher::new(MatchingConfig {
            restrict_to_counterparty: false,
            ..MatchingConfig::default()
        });
        assert_eq!(
            open.rank(&item, vec![invoice("B", "globex", "Globex", 10_000, 0)])
                .len(),
            1
        );
    }

    #[test]
    fn test_ties_break_by_due_date_then_id() {
        let matcher = Matcher::new(MatchingConfig::default());
        let item = item(10_000, "");
        // Same gap from the booking date, so identical scores
        let ranked = matcher.rank(
            &item,
            vec![
                invoice("C", "x", "X", 10_000, 10),
                invoice("B", "x", "X", 10_000, -10),
                invoice("A", "x", "X", 10_000, 10),
            ],
        );
        let ids: Vec<&str> = ranked.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_filters_currency_direction_and_zero_scores() {
        let matcher = Matcher::new(MatchingConfig::default());
        let item = item(10_000, "");

        let mut usd = invoice("USD", "x", "X", 10_000, 0);
        usd.amount_total = Money::new(10_000, Currency::new("USD").unwrap());
        usd.amount_paid = Money::zero(Currency::new("USD").unwrap());
        let mut bill = invoice("BILL", "x", "X", 10_000, 0);
        bill.kind = DocumentKind::Bill;
        let hopeless = invoice("FAR", "x", "X", 90_000, 400);

        let ranked = matcher.rank(&item, vec![usd, bill, hopeless]);
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_ranking_is_restartable_and_truncated() {
        let matcher = Matcher::new(MatchingConfig {
            max_candidates: Some(2),
            ..MatchingConfig::default()
        });
        let item = item(10_000, "");
        let ranked = matcher.rank(
            &item,
            (0..5).map(|i| invoice(&format!("D{i}"), "x", "X", 10_000, i)),
        );
        assert_eq!(ranked.len(), 2);

        let first: Vec<String> = ranked.iter().map(|c| c.document_id.clone()).collect();
        let second: Vec<String> = (&ranked)
            .into_iter()
            .map(|c| c.document_id.clone())
            .collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["D0", "D1"]);
    }

    #[test]
    fn test_fully_allocated_item_has_no_candidates() {
        let matcher = Matcher::new(MatchingConfig::default());
        let mut item = item(10_000, "");
        item.amount_allocated = eur(10_000);
        assert!(matcher
            .rank(&item, vec![invoice("A", "x", "X", 10_000, 0)])
            .is_empty());
    }

    struct FixedScorer(f64);

    impl CounterpartyScorer for FixedScorer {
        fn score(&self, _description: &str, _counterparty_name: &str) -> f64 {
            self.0
        }
    }

    #[test]
    fn test_non_finite_scorer_output_counts_as_no_match() {
        let item = item(10_000, "anything");
        let documents = vec![
            invoice("A", "x", "X", 10_000, 5),
            invoice("B", "y", "Y", 10_000, 0),
        ];
        let plain = Matcher::with_scorer(MatchingConfig::default(), Box::new(FixedScorer(0.0)));
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let matcher =
                Matcher::with_scorer(MatchingConfig::default(), Box::new(FixedScorer(value)));
            let breakdown = matcher.score(&item, &documents[0]);
            assert_eq!(breakdown.counterparty, 0.0);

            let ranked = matcher.rank(&item, documents.clone());
            assert_eq!(ranked, plain.rank(&item, documents.clone()));
            assert_eq!(ranked.best().unwrap().document_id, "B");
        }
    }

    #[test]
    fn test_rank_all_ignores_max_candidates() {
        let matcher = Matcher::new(MatchingConfig {
            max_candidates: Some(1),
            ..MatchingConfig::default()
        });
        let item = item(10_000, "");
        let documents = vec![
            invoice("A", "x", "X", 10_000, 0),
            invoice("B", "x", "X", 10_000, 0),
        ];
        assert_eq!(matcher.rank(&item, documents.clone()).len(), 1);
        let all = matcher.rank_all(&item, documents);
        assert_eq!(all.len(), 2);
        assert_eq!(all.best().unwrap().score, all.runner_up().unwrap().score);
    }

    #[test]
    fn test_custom_scorer_is_used() {
        let matcher = Matcher::with_scorer(MatchingConfig::default(), Box::new(FixedScorer(0.5)));
        let item = item(10_000, "anything");
        let breakdown = matcher.score(&item, &invoice("A", "x", "X", 10_000, 0));
        assert_eq!(breakdown.counterparty, 0.5);
    }
}
