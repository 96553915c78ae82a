//! In-memory snapshot provider for testing and development

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::money::Currency;
use crate::traits::*;
use crate::types::*;

#[derive(Debug, Default)]
struct Tables {
    items: HashMap<String, ReconcilableItem>,
    documents: HashMap<String, OpenDocument>,
    allocations: HashMap<String, Allocation>,
}

/// In-memory provider; clones share the same tables.
///
/// All tables sit behind one lock so a [`ChangeSet`] is applied atomically
/// with respect to every other reader and writer.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
    available: Arc<AtomicBool>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate an outage: while unavailable every call fails with
    /// `ProviderUnavailable`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> ReconResult<()> {
        let mut tables = self.write()?;
        tables.items.clear();
        tables.documents.clear();
        tables.allocations.clear();
        Ok(())
    }

    fn ensure_available(&self) -> ReconResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ReconError::ProviderUnavailable(
                "memory storage is offline".to_string(),
            ))
        }
    }

    fn read(&self) -> ReconResult<RwLockReadGuard<'_, Tables>> {
        self.ensure_available()?;
        self.tables
            .read()
            .map_err(|_| ReconError::ProviderUnavailable("storage lock poisoned".to_string()))
    }

    fn write(&self) -> ReconResult<RwLockWriteGuard<'_, Tables>> {
        self.ensure_available()?;
        self.tables
            .write()
            .map_err(|_| ReconError::ProviderUnavailable("storage lock poisoned".to_string()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn check_version(kind: &str, id: &str, stored: u64, expected: u64) -> ReconResult<()> {
    if stored != expected {
        return Err(ReconError::Conflict(format!(
            "{} '{}' changed concurrently (read version {}, stored version {})",
            kind, id, expected, stored
        )));
    }
    Ok(())
}

#[async_trait]
impl LedgerSnapshotProvider for MemoryStorage {
    async fn insert_item(&mut self, item: &ReconcilableItem) -> ReconResult<()> {
        let mut tables = self.write()?;
        if tables.items.contains_key(&item.id) {
            return Err(ReconError::Conflict(format!(
                "item '{}' already exists",
                item.id
            )));
        }
        tables.items.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_item(&self, item_id: &str) -> ReconResult<Option<ReconcilableItem>> {
        Ok(self.read()?.items.get(item_id).cloned())
    }

    async fn list_items(&self, account_id: Option<&str>) -> ReconResult<Vec<ReconcilableItem>> {
        let tables = self.read()?;
        let mut items: Vec<ReconcilableItem> = tables
            .items
            .values()
            .filter(|item| account_id.is_none_or(|account| item.account_id == account))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn save_document(&mut self, document: &OpenDocument) -> ReconResult<()> {
        let mut tables = self.write()?;
        let mut document = document.clone();
        if let Some(existing) = tables.documents.get(&document.id) {
            document.version = existing.version + 1;
        }
        tables.documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> ReconResult<Option<OpenDocument>> {
        Ok(self.read()?.documents.get(document_id).cloned())
    }

    async fn list_open_documents(
        &self,
        currency: &Currency,
        counterparty_id: Option<&str>,
    ) -> ReconResult<Vec<OpenDocument>> {
        let tables = self.read()?;
        let mut documents: Vec<OpenDocument> = tables
            .documents
            .values()
            .filter(|doc| doc.is_open() && doc.currency() == currency)
            .filter(|doc| counterparty_id.is_none_or(|cp| doc.counterparty_id == cp))
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(documents)
    }

    async fn get_allocation(&self, allocation_id: &str) -> ReconResult<Option<Allocation>> {
        Ok(self.read()?.allocations.get(allocation_id).cloned())
    }

    async fn list_allocations(&self, item_id: &str) -> ReconResult<Vec<Allocation>> {
        let tables = self.read()?;
        let mut allocations: Vec<Allocation> = tables
            .allocations
            .values()
            .filter(|allocation| allocation.item_id == item_id)
            .cloned()
            .collect();
        allocations.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(allocations)
    }

    async fn commit(&mut self, changes: ChangeSet) -> ReconResult<()> {
        let mut tables = self.write()?;

        // Validate everything before the first write
        let stored_item = tables
            .items
            .get(&changes.item.id)
            .ok_or_else(|| ReconError::NotFound(format!("item '{}'", changes.item.id)))?;
        check_version("item", &changes.item.id, stored_item.version, changes.item.version)?;

        for document in &changes.documents {
            let stored = tables
                .documents
                .get(&document.id)
                .ok_or_else(|| ReconError::NotFound(format!("document '{}'", document.id)))?;
            check_version("document", &document.id, stored.version, document.version)?;
        }

        for allocation_id in &changes.delete_allocations {
            match tables.allocations.get(allocation_id) {
                Some(allocation) if allocation.item_id == changes.item.id => {}
                _ => {
                    return Err(ReconError::NotFound(format!(
                        "allocation '{}' of item '{}'",
                        allocation_id, changes.item.id
                    )))
                }
            }
        }

        for allocation in &changes.insert_allocations {
            if allocation.item_id != changes.item.id {
                return Err(ReconError::Validation(format!(
                    "allocation '{}' does not belong to item '{}'",
                    allocation.id, changes.item.id
                )));
            }
            if tables.allocations.contains_key(&allocation.id) {
                return Err(ReconError::Conflict(format!(
                    "allocation '{}' already exists",
                    allocation.id
                )));
            }
        }

        let mut item = changes.item;
        item.version += 1;
        tables.items.insert(item.id.clone(), item);

        for mut document in changes.documents {
            document.version += 1;
            tables.documents.insert(document.id.clone(), document);
        }

        for allocation_id in &changes.delete_allocations {
            tables.allocations.remove(allocation_id);
        }

        for allocation in changes.insert_allocations {
            tables.allocations.insert(allocation.id.clone(), allocation);
        }

        Ok(())
    }
}
