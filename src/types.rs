//! Core types and data structures for the reconciliation engine

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::engine::lifecycle::ItemState;
use crate::money::{Currency, Money};

/// Source of a reconcilable item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Line imported from a bank statement; reconciled once fully allocated
    BankTransaction,
    /// Cash-book entry; may stay partially allocated
    CashEntry,
}

/// Direction of money movement relative to the business
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inflow,
    Outflow,
}

/// Kind of accounting document a payment can be allocated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Customer invoice, settled by inflows
    Invoice,
    /// Supplier bill, settled by outflows
    Bill,
}

impl DocumentKind {
    /// Which payment direction settles this kind of document
    pub fn settled_by(&self) -> Direction {
        match self {
            DocumentKind::Invoice => Direction::Inflow,
            DocumentKind::Bill => Direction::Outflow,
        }
    }
}

/// Bank transaction or cash-book entry awaiting allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilableItem {
    /// Unique identifier for the item
    pub id: String,
    pub kind: ItemKind,
    /// Bank account or cash book the item belongs to
    pub account_id: String,
    /// Booking date
    pub date: NaiveDate,
    /// Signed amount: positive is an inflow, negative an outflow
    pub amount: Money,
    /// Linked counterparty, if the statement line could be attributed
    pub counterparty_id: Option<String>,
    /// Free text from the statement or cash book
    pub description: String,
    pub state: ItemState,
    /// Portion of `|amount|` already applied to documents
    pub amount_allocated: Money,
    /// Optimistic concurrency token, bumped by the provider on every commit
    pub version: u64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ReconcilableItem {
    /// Create a new draft item
    pub fn new(new_item: NewItem) -> Self {
        let now = chrono::Utc::now().naive_utc();
        let currency = new_item.amount.currency().clone();
        Self {
            id: new_item.id,
            kind: new_item.kind,
            account_id: new_item.account_id,
            date: new_item.date,
            amount: new_item.amount,
            counterparty_id: new_item.counterparty_id,
            description: new_item.description,
            state: ItemState::Draft,
            amount_allocated: Money::zero(currency),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn currency(&self) -> &Currency {
        self.amount.currency()
    }

    pub fn direction(&self) -> Direction {
        if self.amount.is_negative() {
            Direction::Outflow
        } else {
            Direction::Inflow
        }
    }

    /// `|amount|`
    pub fn magnitude(&self) -> Money {
        Money::new(
            self.amount.minor_units().saturating_abs(),
            self.currency().clone(),
        )
    }

    /// `|amount| - amount_allocated`
    pub fn amount_unallocated(&self) -> Money {
        Money::new(
            self.magnitude().minor_units() - self.amount_allocated.minor_units(),
            self.currency().clone(),
        )
    }

    pub fn is_fully_allocated(&self) -> bool {
        self.amount_unallocated().is_zero()
    }

    /// Confirmed and still carrying an unallocated remainder
    pub fn is_unreconciled(&self) -> bool {
        self.state == ItemState::Confirmed && !self.is_fully_allocated()
    }
}

/// Input for creating a draft item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub id: String,
    pub kind: ItemKind,
    pub account_id: String,
    pub date: NaiveDate,
    pub amount: Money,
    pub counterparty_id: Option<String>,
    pub description: String,
}

impl NewItem {
    /// Bank statement line without a linked counterparty
    pub fn bank_transaction(
        id: impl Into<String>,
        account_id: impl Into<String>,
        date: NaiveDate,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::BankTransaction,
            account_id: account_id.into(),
            date,
            amount,
            counterparty_id: None,
            description: description.into(),
        }
    }

    /// Cash-book entry without a linked counterparty
    pub fn cash_entry(
        id: impl Into<String>,
        account_id: impl Into<String>,
        date: NaiveDate,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: ItemKind::CashEntry,
            ..Self::bank_transaction(id, account_id, date, amount, description)
        }
    }

    /// Link the item to a known counterparty
    pub fn counterparty(mut self, counterparty_id: impl Into<String>) -> Self {
        self.counterparty_id = Some(counterparty_id.into());
        self
    }
}

/// Edits applicable to a draft item; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub date: Option<NaiveDate>,
    pub amount: Option<Money>,
    /// `Some(None)` unlinks the counterparty
    pub counterparty_id: Option<Option<String>>,
    pub description: Option<String>,
}

/// Invoice or bill with an amount that may still be due
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenDocument {
    pub id: String,
    pub kind: DocumentKind,
    pub counterparty_id: String,
    /// Display name, used for fuzzy matching against statement text
    pub counterparty_name: String,
    pub amount_total: Money,
    pub amount_paid: Money,
    pub due_date: NaiveDate,
    /// Optimistic concurrency token, bumped by the provider on every write
    pub version: u64,
}

impl OpenDocument {
    /// Create an unpaid document
    pub fn new(
        id: impl Into<String>,
        kind: DocumentKind,
        counterparty_id: impl Into<String>,
        counterparty_name: impl Into<String>,
        amount_total: Money,
        due_date: NaiveDate,
    ) -> Self {
        let currency = amount_total.currency().clone();
        Self {
            id: id.into(),
            kind,
            counterparty_id: counterparty_id.into(),
            counterparty_name: counterparty_name.into(),
            amount_total,
            amount_paid: Money::zero(currency),
            due_date,
            version: 0,
        }
    }

    pub fn currency(&self) -> &Currency {
        self.amount_total.currency()
    }

    /// `amount_total - amount_paid`
    pub fn amount_due(&self) -> Money {
        Money::new(
            self.amount_total.minor_units() - self.amount_paid.minor_units(),
            self.currency().clone(),
        )
    }

    /// Whether the document is still part of the open pool
    pub fn is_open(&self) -> bool {
        self.amount_due().is_positive()
    }
}

/// Application of part of an item's amount against one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: String,
    pub item_id: String,
    pub document_id: String,
    pub amount_applied: Money,
    pub created_at: NaiveDateTime,
}

impl Allocation {
    pub fn new(item_id: &str, document_id: &str, amount_applied: Money) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_id: item_id.to_string(),
            document_id: document_id.to_string(),
            amount_applied,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}

/// One requested (document, amount) pair of an allocation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub document_id: String,
    pub amount: Money,
    /// Document version the caller based the request on; a newer stored
    /// version fails the request with [`ReconError::Conflict`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

impl AllocationLine {
    pub fn new(document_id: impl Into<String>, amount: Money) -> Self {
        Self {
            document_id: document_id.into(),
            amount,
            expected_version: None,
        }
    }

    /// Pin the request to the document version it was computed from
    pub fn with_expected_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// Discriminant of [`ReconError`], stable on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidStateTransition,
    InvalidAmount,
    OverAllocation,
    CurrencyMismatch,
    NotFound,
    Conflict,
    ProviderUnavailable,
    Validation,
    Configuration,
}

/// Errors that can occur in the reconciliation engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconError {
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Over-allocation: {0}")]
    OverAllocation(String),
    #[error("Currency mismatch: {0}")]
    CurrencyMismatch(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ReconError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconError::InvalidStateTransition(_) => ErrorKind::InvalidStateTransition,
            ReconError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            ReconError::OverAllocation(_) => ErrorKind::OverAllocation,
            ReconError::CurrencyMismatch(_) => ErrorKind::CurrencyMismatch,
            ReconError::NotFound(_) => ErrorKind::NotFound,
            ReconError::Conflict(_) => ErrorKind::Conflict,
            ReconError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            ReconError::Validation(_) => ErrorKind::Validation,
            ReconError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Detail message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            ReconError::InvalidStateTransition(m)
            | ReconError::InvalidAmount(m)
            | ReconError::OverAllocation(m)
            | ReconError::CurrencyMismatch(m)
            | ReconError::NotFound(m)
            | ReconError::Conflict(m)
            | ReconError::ProviderUnavailable(m)
            | ReconError::Validation(m)
            | ReconError::Configuration(m) => m,
        }
    }

    /// Infrastructure failures abort whole batches; everything else is per-item
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, ReconError::ProviderUnavailable(_))
    }
}

/// Serializable form of an error for callers across an API boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ReconError> for ErrorReport {
    fn from(error: &ReconError) -> Self {
        Self {
            kind: error.kind(),
            message: error.message().to_string(),
        }
    }
}

/// Result type for reconciliation operations
pub type ReconResult<T> = Result<T, ReconError>;
