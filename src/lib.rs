//! # Reconciliation Core
//!
//! Matches bank transactions and cash entries against open invoices and bills,
//! allocates amounts between them and drives each item through its lifecycle.
//!
//! ## Features
//!
//! - **Exact money**: integer minor units with ISO 4217 exponents
//! - **Lifecycle**: `draft → confirmed → reconciled`, with cancellation releasing allocations
//! - **Matching**: weighted amount, counterparty and date signals with deterministic ranking
//! - **Allocation**: all-or-nothing change sets with optimistic concurrency
//! - **Auto-reconciliation**: accepts only exact, confident, unambiguous matches
//! - **Storage abstraction**: backend-agnostic design with a trait-based snapshot provider
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::{
//!     utils::MemoryStorage, Currency, DocumentKind, Money, NewItem, OpenDocument,
//!     ReconciliationEngine,
//! };
//! use chrono::NaiveDate;
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Builder::new_multi_thread().build().unwrap();
//! # rt.block_on(async {
//! let eur = Currency::new("EUR").unwrap();
//! let due = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
//! let mut engine = ReconciliationEngine::new(MemoryStorage::new());
//!
//! engine
//!     .register_document(OpenDocument::new(
//!         "INV-1", DocumentKind::Invoice, "acme", "ACME", Money::new(50_000, eur.clone()), due,
//!     ))
//!     .await
//!     .unwrap();
//! engine
//!     .create_item(NewItem::bank_transaction(
//!         "tx-1", "bank", due, Money::new(50_000, eur), "ACME invoice INV-1",
//!     ))
//!     .await
//!     .unwrap();
//! engine.confirm("tx-1").await.unwrap();
//!
//! let report = engine.auto_reconcile("bank").await.unwrap();
//! assert_eq!(report.matched, 1);
//! # });
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod money;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use engine::{
    Allocator, ItemAction, ItemEvent, ItemManager, ItemState, ReconciliationEngine,
};
pub use money::*;
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
