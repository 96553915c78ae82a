//! Allocation of item amounts against open documents

use std::collections::BTreeMap;
use tracing::info;

use crate::engine::lifecycle::{ItemAction, ItemEvent};
use crate::money::Money;
use crate::traits::*;
use crate::types::*;

/// Validates and commits allocations between items and documents
pub struct Allocator<S: LedgerSnapshotProvider> {
    pub(crate) storage: S,
}

impl<S: LedgerSnapshotProvider> Allocator<S> {
    /// Create a new allocator
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Get an item by ID, returning an error if not found
    pub async fn get_item_required(&self, item_id: &str) -> ReconResult<ReconcilableItem> {
        self.storage
            .get_item(item_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("item '{}'", item_id)))
    }

    /// Get a document by ID, returning an error if not found
    pub async fn get_document_required(&self, document_id: &str) -> ReconResult<OpenDocument> {
        self.storage
            .get_document(document_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("document '{}'", document_id)))
    }

    /// Apply `lines` to the item, all or nothing.
    ///
    /// The whole request is validated against freshly read state before a
    /// single change set is committed. Bank transactions that end up fully
    /// allocated are reconciled in the same commit.
    pub async fn apply(
        &mut self,
        item_id: &str,
        lines: Vec<AllocationLine>,
    ) -> ReconResult<ReconcilableItem> {
        let mut item = self.get_item_required(item_id).await?;
        item.state.ensure_permits(ItemAction::Allocate)?;

        if lines.is_empty() {
            return Err(ReconError::InvalidAmount(
                "allocation request has no lines".to_string(),
            ));
        }

        let currency = item.currency().clone();
        for line in &lines {
            if !line.amount.is_positive() {
                return Err(ReconError::InvalidAmount(format!(
                    "amount {} for document '{}' must be positive",
                    line.amount, line.document_id
                )));
            }
            line.amount.ensure_currency(&currency)?;
        }

        let requested = lines
            .iter()
            .try_fold(Money::zero(currency.clone()), |sum, line| {
                sum.checked_add(&line.amount)
            })?;
        let unallocated = item.amount_unallocated();
        if requested.minor_units() > unallocated.minor_units() {
            return Err(ReconError::OverAllocation(format!(
                "requested {} but item '{}' has only {} unallocated",
                requested, item.id, unallocated
            )));
        }

        // Lines naming the same document are applied as one allocation
        let mut per_document: BTreeMap<&str, Money> = BTreeMap::new();
        for line in &lines {
            let total = match per_document.get(line.document_id.as_str()) {
                Some(existing) => existing.checked_add(&line.amount)?,
                None => line.amount.clone(),
            };
            per_document.insert(line.document_id.as_str(), total);
        }

        let mut documents = Vec::with_capacity(per_document.len());
        for (document_id, amount) in &per_document {
            let document = self.get_document_required(document_id).await?;
            if document.currency() != &currency {
                return Err(ReconError::CurrencyMismatch(format!(
                    "document '{}' is in {}, item '{}' is in {}",
                    document.id,
                    document.currency(),
                    item.id,
                    currency
                )));
            }
            let due = document.amount_due();
            if amount.minor_units() > due.minor_units() {
                return Err(ReconError::OverAllocation(format!(
                    "requested {} but document '{}' has only {} due",
                    amount, document.id, due
                )));
            }
            documents.push(document);
        }

        for line in &lines {
            let Some(expected) = line.expected_version else {
                continue;
            };
            if let Some(document) = documents.iter().find(|d| d.id == line.document_id) {
                if document.version != expected {
                    return Err(ReconError::Conflict(format!(
                        "document '{}' changed since it was read (expected version {}, found {})",
                        document.id, expected, document.version
                    )));
                }
            }
        }

        // Everything validated; build the change set
        let mut changes = ChangeSet::for_item(item.clone());
        // `documents` was read in `per_document` order
        for (mut document, amount) in documents.into_iter().zip(per_document.into_values()) {
            document.amount_paid = document.amount_paid.checked_add(&amount)?;
            changes = changes
                .insert_allocation(Allocation::new(&item.id, &document.id, amount))
                .update_document(document);
        }

        item.amount_allocated = item.amount_allocated.checked_add(&requested)?;
        if item.kind == ItemKind::BankTransaction && item.is_fully_allocated() {
            item.state = item.state.transition(ItemEvent::FullyAllocated)?;
        }
        item.updated_at = chrono::Utc::now().naive_utc();
        changes.item = item;

        let allocation_count = changes.insert_allocations.len();
        self.storage.commit(changes).await?;

        let item = self.get_item_required(item_id).await?;
        info!(
            item_id = %item.id,
            allocations = allocation_count,
            amount = %requested,
            unallocated = %item.amount_unallocated(),
            state = %item.state,
            "allocated item"
        );
        Ok(item)
    }

    /// Reverse one allocation of a confirmed item
    pub async fn remove(
        &mut self,
        item_id: &str,
        allocation_id: &str,
    ) -> ReconResult<ReconcilableItem> {
        let mut item = self.get_item_required(item_id).await?;
        item.state.ensure_permits(ItemAction::RemoveAllocation)?;

        let allocation = self
            .storage
            .get_allocation(allocation_id)
            .await?
            .filter(|allocation| allocation.item_id == item.id)
            .ok_or_else(|| {
                ReconError::NotFound(format!(
                    "allocation '{}' of item '{}'",
                    allocation_id, item_id
                ))
            })?;

        let mut document = self.get_document_required(&allocation.document_id).await?;
        document.amount_paid = document
            .amount_paid
            .checked_sub(&allocation.amount_applied)?;
        item.amount_allocated = item
            .amount_allocated
            .checked_sub(&allocation.amount_applied)?;
        item.updated_at = chrono::Utc::now().naive_utc();

        self.storage
            .commit(
                ChangeSet::for_item(item)
                    .update_document(document)
                    .delete_allocation(allocation.id.clone()),
            )
            .await?;

        let item = self.get_item_required(item_id).await?;
        info!(
            item_id = %item.id,
            allocation_id = %allocation.id,
            document_id = %allocation.document_id,
            amount = %allocation.amount_applied,
            "removed allocation"
        );
        Ok(item)
    }
}

/// Change set that cancels `item` and releases every allocation it holds
pub(crate) async fn release_all<S: LedgerSnapshotProvider>(
    storage: &S,
    mut item: ReconcilableItem,
) -> ReconResult<ChangeSet> {
    let allocations = storage.list_allocations(&item.id).await?;

    let mut released: BTreeMap<String, Money> = BTreeMap::new();
    for allocation in &allocations {
        let total = match released.get(&allocation.document_id) {
            Some(existing) => existing.checked_add(&allocation.amount_applied)?,
            None => allocation.amount_applied.clone(),
        };
        released.insert(allocation.document_id.clone(), total);
    }

    item.state = item.state.transition(ItemEvent::Cancel)?;
    item.amount_allocated = Money::zero(item.currency().clone());
    item.updated_at = chrono::Utc::now().naive_utc();

    let mut changes = ChangeSet::for_item(item);
    for (document_id, amount) in released {
        let mut document = storage
            .get_document(&document_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("document '{}'", document_id)))?;
        document.amount_paid = document.amount_paid.checked_sub(&amount)?;
        changes = changes.update_document(document);
    }
    for allocation in allocations {
        changes = changes.delete_allocation(allocation.id);
    }

    Ok(changes)
}
