//! Item lifecycle management

use tracing::info;

use crate::engine::allocator::release_all;
use crate::engine::lifecycle::{ItemAction, ItemEvent};
use crate::money::Money;
use crate::traits::*;
use crate::types::*;

/// Item manager for creating, editing and moving items through their lifecycle
pub struct ItemManager<S: LedgerSnapshotProvider> {
    pub(crate) storage: S,
    validator: Box<dyn ItemValidator>,
}

impl<S: LedgerSnapshotProvider> ItemManager<S> {
    /// Create a new item manager
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultItemValidator),
        }
    }

    /// Create a new item manager with custom validator
    pub fn with_validator(storage: S, validator: Box<dyn ItemValidator>) -> Self {
        Self { storage, validator }
    }

    pub(crate) fn validator(&self) -> &dyn ItemValidator {
        self.validator.as_ref()
    }

    /// Create a new draft item
    pub async fn create_item(&mut self, new_item: NewItem) -> ReconResult<ReconcilableItem> {
        let item = ReconcilableItem::new(new_item);

        // Validate the item
        self.validator.validate_item(&item)?;

        // Check if item already exists
        if self.storage.get_item(&item.id).await?.is_some() {
            return Err(ReconError::Validation(format!(
                "Item with ID '{}' already exists",
                item.id
            )));
        }

        self.storage.insert_item(&item).await?;
        info!(item_id = %item.id, amount = %item.amount, "created draft item");

        Ok(item)
    }

    /// Get an item by ID
    pub async fn get_item(&self, item_id: &str) -> ReconResult<Option<ReconcilableItem>> {
        self.storage.get_item(item_id).await
    }

    /// Get an item by ID, returning an error if not found
    pub async fn get_item_required(&self, item_id: &str) -> ReconResult<ReconcilableItem> {
        self.storage
            .get_item(item_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("item '{}'", item_id)))
    }

    /// List items in every state, optionally for one account
    pub async fn list_items(&self, account_id: Option<&str>) -> ReconResult<Vec<ReconcilableItem>> {
        self.storage.list_items(account_id).await
    }

    /// Confirmed items with an unallocated remainder, by date then id
    pub async fn list_unreconciled(
        &self,
        account_id: Option<&str>,
    ) -> ReconResult<Vec<ReconcilableItem>> {
        Ok(self
            .storage
            .list_items(account_id)
            .await?
            .into_iter()
            .filter(ReconcilableItem::is_unreconciled)
            .collect())
    }

    /// Allocations currently held by an item
    pub async fn list_allocations(&self, item_id: &str) -> ReconResult<Vec<Allocation>> {
        self.get_item_required(item_id).await?;
        self.storage.list_allocations(item_id).await
    }

    /// Edit a draft item
    pub async fn update_draft(
        &mut self,
        item_id: &str,
        patch: ItemPatch,
    ) -> ReconResult<ReconcilableItem> {
        let mut item = self.get_item_required(item_id).await?;
        item.state.ensure_permits(ItemAction::Edit)?;

        if let Some(date) = patch.date {
            item.date = date;
        }
        if let Some(amount) = patch.amount {
            // Drafts never hold allocations, so the allocated total follows the currency
            item.amount_allocated = Money::zero(amount.currency().clone());
            item.amount = amount;
        }
        if let Some(counterparty_id) = patch.counterparty_id {
            item.counterparty_id = counterparty_id;
        }
        if let Some(description) = patch.description {
            item.description = description;
        }
        item.updated_at = chrono::Utc::now().naive_utc();

        self.validator.validate_item(&item)?;
        self.storage.commit(ChangeSet::for_item(item)).await?;

        self.get_item_required(item_id).await
    }

    /// Move a draft item to `confirmed`
    pub async fn confirm(&mut self, item_id: &str) -> ReconResult<ReconcilableItem> {
        let mut item = self.get_item_required(item_id).await?;
        item.state = item.state.transition(ItemEvent::Confirm)?;
        item.updated_at = chrono::Utc::now().naive_utc();

        self.storage.commit(ChangeSet::for_item(item)).await?;
        info!(item_id = %item_id, "confirmed item");

        self.get_item_required(item_id).await
    }

    /// Cancel a draft or confirmed item, releasing its allocations in the
    /// same commit
    pub async fn cancel(&mut self, item_id: &str) -> ReconResult<ReconcilableItem> {
        let item = self.get_item_required(item_id).await?;
        item.state.ensure_permits(ItemAction::Cancel)?;

        let changes = release_all(&self.storage, item).await?;
        let released = changes.delete_allocations.len();

        self.storage.commit(changes).await?;
        info!(item_id = %item_id, released, "cancelled item");

        self.get_item_required(item_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::lifecycle::ItemState;
    use crate::money::Currency;
    use crate::utils::memory_storage::MemoryStorage;
    use chrono::NaiveDate;

    fn eur(minor: i64) -> Money {
        Money::new(minor, Currency::new("EUR").unwrap())
    }

    fn new_item(id: &str) -> NewItem {
        NewItem::cash_entry(
            id,
            "till",
            NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            eur(2_500),
            "Cash sale",
        )
    }

    #[tokio::test]
    async fn test_create_and_confirm() {
        let mut manager = ItemManager::new(MemoryStorage::new());
        let item = manager.create_item(new_item("c1")).await.unwrap();
        assert_eq!(item.state, ItemState::Draft);

        let duplicate = manager.create_item(new_item("c1")).await;
        assert!(matches!(duplicate, Err(ReconError::Validation(_))));

        let item = manager.confirm("c1").await.unwrap();
        assert_eq!(item.state, ItemState::Confirmed);

        let again = manager.confirm("c1").await;
        assert!(matches!(again, Err(ReconError::InvalidStateTransition(_))));
    }

    #[tokio::test]
    async fn test_zero_amount_is_rejected() {
        let mut manager = ItemManager::new(MemoryStorage::new());
        let mut zero = new_item("c1");
        zero.amount = eur(0);
        let result = manager.create_item(zero).await;
        assert!(matches!(result, Err(ReconError::InvalidAmount(_))));
    }

    #[tokio::test]
    async fn test_drafts_are_editable_until_confirmed() {
        let mut manager = ItemManager::new(MemoryStorage::new());
        manager.create_item(new_item("c1")).await.unwrap();

        let patch = ItemPatch {
            amount: Some(Money::new(-990, Currency::new("USD").unwrap())),
            counterparty_id: Some(Some("acme".to_string())),
            description: Some("Refund".to_string()),
            ..ItemPatch::default()
        };
        let item = manager.update_draft("c1", patch).await.unwrap();
        assert_eq!(item.currency().code(), "USD");
        assert_eq!(item.amount_allocated.currency().code(), "USD");
        assert_eq!(item.counterparty_id.as_deref(), Some("acme"));
        assert_eq!(item.version, 1);

        manager.confirm("c1").await.unwrap();
        let edit = manager.update_draft("c1", ItemPatch::default()).await;
        assert!(matches!(edit, Err(ReconError::InvalidStateTransition(_))));
    }

    #[tokio::test]
    async fn test_cancel_is_terminal() {
        let mut manager = ItemManager::new(MemoryStorage::new());
        manager.create_item(new_item("c1")).await.unwrap();

        let item = manager.cancel("c1").await.unwrap();
        assert_eq!(item.state, ItemState::Cancelled);

        assert!(manager.cancel("c1").await.is_err());
        assert!(manager.confirm("c1").await.is_err());
    }

    #[tokio::test]
    async fn test_list_unreconciled_skips_drafts() {
        let mut manager = ItemManager::new(MemoryStorage::new());
        manager.create_item(new_item("c1")).await.unwrap();
        manager.create_item(new_item("c2")).await.unwrap();
        manager.confirm("c2").await.unwrap();

        let open = manager.list_unreconciled(Some("till")).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "c2");
        assert!(manager
            .list_unreconciled(Some("other"))
            .await
            .unwrap()
            .is_empty());
    }
}
