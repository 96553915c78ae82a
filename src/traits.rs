//! Traits for storage abstraction and extensibility

use async_trait::async_trait;

use crate::money::Currency;
use crate::types::*;

/// Snapshot provider for the reconciliation engine
///
/// The provider is the single source of truth for items, documents and
/// allocations. The engine never caches what it reads; every mutation is
/// handed back as one [`ChangeSet`] that the provider applies atomically.
/// Backends (PostgreSQL, a remote API, in-memory) implement these methods and
/// report outages as [`ReconError::ProviderUnavailable`].
#[async_trait]
pub trait LedgerSnapshotProvider: Send + Sync {
    /// Store a new item; fails with `Conflict` if the id is taken
    async fn insert_item(&mut self, item: &ReconcilableItem) -> ReconResult<()>;

    /// Get an item by ID
    async fn get_item(&self, item_id: &str) -> ReconResult<Option<ReconcilableItem>>;

    /// List items, optionally for one account, ordered by date then id
    async fn list_items(&self, account_id: Option<&str>) -> ReconResult<Vec<ReconcilableItem>>;

    /// Insert or replace a document; replacing bumps its version
    async fn save_document(&mut self, document: &OpenDocument) -> ReconResult<()>;

    /// Get a document by ID, open or settled
    async fn get_document(&self, document_id: &str) -> ReconResult<Option<OpenDocument>>;

    /// Documents with a nonzero amount due in `currency`, optionally for one
    /// counterparty, ordered by id
    async fn list_open_documents(
        &self,
        currency: &Currency,
        counterparty_id: Option<&str>,
    ) -> ReconResult<Vec<OpenDocument>>;

    /// Get an allocation by ID
    async fn get_allocation(&self, allocation_id: &str) -> ReconResult<Option<Allocation>>;

    /// Allocations of one item, oldest first
    async fn list_allocations(&self, item_id: &str) -> ReconResult<Vec<Allocation>>;

    /// Apply a change set atomically.
    ///
    /// Every entity in the set carries the version it was read at. If any
    /// stored version differs the whole set is rejected with `Conflict` and
    /// nothing is written. On success each written entity's version is bumped.
    async fn commit(&mut self, changes: ChangeSet) -> ReconResult<()>;
}

/// Atomic unit of mutation: one item plus the documents and allocation rows
/// that change with it
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    /// New item state; `version` is the version it was read at
    pub item: ReconcilableItem,
    /// New document states; each `version` is the version it was read at
    pub documents: Vec<OpenDocument>,
    pub insert_allocations: Vec<Allocation>,
    pub delete_allocations: Vec<String>,
}

impl ChangeSet {
    pub fn for_item(item: ReconcilableItem) -> Self {
        Self {
            item,
            documents: Vec::new(),
            insert_allocations: Vec::new(),
            delete_allocations: Vec::new(),
        }
    }

    pub fn update_document(mut self, document: OpenDocument) -> Self {
        self.documents.push(document);
        self
    }

    pub fn insert_allocation(mut self, allocation: Allocation) -> Self {
        self.insert_allocations.push(allocation);
        self
    }

    pub fn delete_allocation(mut self, allocation_id: impl Into<String>) -> Self {
        self.delete_allocations.push(allocation_id.into());
        self
    }
}

/// Free-text similarity between a statement description and a counterparty
/// name, in [0, 1]
pub trait CounterpartyScorer: Send + Sync {
    fn score(&self, description: &str, counterparty_name: &str) -> f64;
}

/// Trait for implementing custom item and document validation rules
pub trait ItemValidator: Send + Sync {
    /// Validate an item before it is stored or edited
    fn validate_item(&self, item: &ReconcilableItem) -> ReconResult<()>;

    /// Validate a document before it is registered
    fn validate_document(&self, document: &OpenDocument) -> ReconResult<()>;
}

/// Default validator with the basic money rules
pub struct DefaultItemValidator;

impl ItemValidator for DefaultItemValidator {
    fn validate_item(&self, item: &ReconcilableItem) -> ReconResult<()> {
        if item.id.trim().is_empty() {
            return Err(ReconError::Validation("Item ID cannot be empty".to_string()));
        }

        if item.account_id.trim().is_empty() {
            return Err(ReconError::Validation(
                "Account ID cannot be empty".to_string(),
            ));
        }

        if item.amount.is_zero() {
            return Err(ReconError::InvalidAmount(
                "Item amount cannot be zero".to_string(),
            ));
        }

        if item.description.chars().count() > 500 {
            return Err(ReconError::Validation(
                "Description cannot exceed 500 characters".to_string(),
            ));
        }

        // |amount| must be representable
        item.amount.checked_abs()?;
        item.amount_allocated.ensure_currency(item.currency())?;

        Ok(())
    }

    fn validate_document(&self, document: &OpenDocument) -> ReconResult<()> {
        if document.id.trim().is_empty() {
            return Err(ReconError::Validation(
                "Document ID cannot be empty".to_string(),
            ));
        }

        document.amount_paid.ensure_currency(document.currency())?;

        if !document.amount_total.is_positive() {
            return Err(ReconError::InvalidAmount(format!(
                "Document '{}' total must be positive",
                document.id
            )));
        }

        if document.amount_paid.is_negative() || document.amount_due().is_negative() {
            return Err(ReconError::InvalidAmount(format!(
                "Document '{}' paid amount must lie between zero and its total",
                document.id
            )));
        }

        Ok(())
    }
}
