//! Main engine that coordinates items, documents, matching and allocation

use tracing::info;

use crate::config::EngineConfig;
use crate::engine::{Allocator, ItemManager};
use crate::money::Money;
use crate::reconciliation::{AutoReconcileReport, AutoReconciler, Matcher, RankedCandidates};
use crate::traits::*;
use crate::types::*;

/// Reconciliation engine over one snapshot provider.
///
/// The provider is cloned into each component, so clones must share state
/// (as [`MemoryStorage`](crate::utils::MemoryStorage) clones do).
pub struct ReconciliationEngine<S: LedgerSnapshotProvider> {
    items: ItemManager<S>,
    allocator: Allocator<S>,
    matcher: Matcher,
    auto: AutoReconciler,
}

impl<S: LedgerSnapshotProvider + Clone> ReconciliationEngine<S> {
    /// Create an engine with the default configuration
    pub fn new(storage: S) -> Self {
        let config = EngineConfig::default();
        Self {
            items: ItemManager::new(storage.clone()),
            allocator: Allocator::new(storage),
            matcher: Matcher::new(config.matching),
            auto: AutoReconciler::new(config.auto_reconcile),
        }
    }

    /// Create an engine with a validated configuration
    pub fn with_config(storage: S, config: EngineConfig) -> ReconResult<Self> {
        config.validate()?;
        Ok(Self {
            items: ItemManager::new(storage.clone()),
            allocator: Allocator::new(storage),
            matcher: Matcher::new(config.matching),
            auto: AutoReconciler::new(config.auto_reconcile),
        })
    }

    /// Create an engine with a custom validator and counterparty scorer
    pub fn with_components(
        storage: S,
        config: EngineConfig,
        validator: Box<dyn ItemValidator>,
        scorer: Box<dyn CounterpartyScorer>,
    ) -> ReconResult<Self> {
        config.validate()?;
        Ok(Self {
            items: ItemManager::with_validator(storage.clone(), validator),
            allocator: Allocator::new(storage),
            matcher: Matcher::with_scorer(config.matching, scorer),
            auto: AutoReconciler::new(config.auto_reconcile),
        })
    }

    pub fn storage(&self) -> &S {
        &self.items.storage
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    // Item operations
    /// Create a new draft item
    pub async fn create_item(&mut self, new_item: NewItem) -> ReconResult<ReconcilableItem> {
        self.items.create_item(new_item).await
    }

    /// Edit a draft item
    pub async fn update_draft(
        &mut self,
        item_id: &str,
        patch: ItemPatch,
    ) -> ReconResult<ReconcilableItem> {
        self.items.update_draft(item_id, patch).await
    }

    /// Get an item by ID
    pub async fn get_item(&self, item_id: &str) -> ReconResult<Option<ReconcilableItem>> {
        self.items.get_item(item_id).await
    }

    pub async fn confirm(&mut self, item_id: &str) -> ReconResult<ReconcilableItem> {
        self.items.confirm(item_id).await
    }

    /// Cancel an item and release all of its allocations
    pub async fn cancel(&mut self, item_id: &str) -> ReconResult<ReconcilableItem> {
        self.items.cancel(item_id).await
    }

    /// Confirmed items with an unallocated remainder, by date then id
    pub async fn list_unreconciled(
        &self,
        account_id: Option<&str>,
    ) -> ReconResult<Vec<ReconcilableItem>> {
        self.items.list_unreconciled(account_id).await
    }

    pub async fn list_allocations(&self, item_id: &str) -> ReconResult<Vec<Allocation>> {
        self.items.list_allocations(item_id).await
    }

    // Document operations
    /// Insert or replace an open document.
    ///
    /// Re-registering an existing document updates its descriptive fields and
    /// total only; the paid amount stays what the stored allocations made it,
    /// and the new total may not fall below it.
    pub async fn register_document(
        &mut self,
        mut document: OpenDocument,
    ) -> ReconResult<OpenDocument> {
        if let Some(stored) = self.items.storage.get_document(&document.id).await? {
            document.amount_paid = if stored.amount_paid.is_zero() {
                Money::zero(document.currency().clone())
            } else {
                if stored.currency() != document.currency() {
                    return Err(ReconError::CurrencyMismatch(format!(
                        "document '{}' has {} paid and cannot move to {}",
                        stored.id,
                        stored.amount_paid,
                        document.currency()
                    )));
                }
                stored.amount_paid
            };
        }

        self.items.validator().validate_document(&document)?;
        self.items.storage.save_document(&document).await?;
        info!(document_id = %document.id, amount_due = %document.amount_due(), "registered document");

        self.allocator.get_document_required(&document.id).await
    }

    pub async fn get_document(&self, document_id: &str) -> ReconResult<Option<OpenDocument>> {
        self.items.storage.get_document(document_id).await
    }

    // Matching and allocation
    /// Ranked candidate documents for an item, read fresh from the provider.
    ///
    /// Items that cannot take allocations (drafts, reconciled and cancelled
    /// items) have no candidates.
    pub async fn suggest_matches(&self, item_id: &str) -> ReconResult<RankedCandidates> {
        let item = self.items.get_item_required(item_id).await?;
        if !item.is_unreconciled() {
            return Ok(RankedCandidates::default());
        }
        self.matcher.suggest(&self.items.storage, &item).await
    }

    /// Apply allocation lines to an item, all or nothing
    pub async fn allocate(
        &mut self,
        item_id: &str,
        lines: Vec<AllocationLine>,
    ) -> ReconResult<ReconcilableItem> {
        self.allocator.apply(item_id, lines).await
    }

    pub async fn remove_allocation(
        &mut self,
        item_id: &str,
        allocation_id: &str,
    ) -> ReconResult<ReconcilableItem> {
        self.allocator.remove(item_id, allocation_id).await
    }

    /// Allocate every unambiguous exact match of an account
    pub async fn auto_reconcile(&mut self, account_id: &str) -> ReconResult<AutoReconcileReport> {
        self.auto
            .run(&self.matcher, &mut self.allocator, account_id)
            .await
    }
}
