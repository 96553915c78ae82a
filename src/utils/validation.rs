//! Validation utilities

use crate::money::Money;
use crate::traits::*;
use crate::types::*;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &Money) -> ReconResult<()> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(ReconError::InvalidAmount(format!(
            "Amount must be positive, got {}",
            amount
        )))
    }
}

/// Validate an item, document or account identifier
pub fn validate_identifier(label: &str, id: &str) -> ReconResult<()> {
    if id.trim().is_empty() {
        return Err(ReconError::Validation(format!("{} cannot be empty", label)));
    }

    if id.len() > 64 {
        return Err(ReconError::Validation(format!(
            "{} cannot exceed 64 characters",
            label
        )));
    }

    // Check for valid characters (alphanumeric, dashes, underscores)
    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ReconError::Validation(format!(
            "{} can only contain alphanumeric characters, dashes, and underscores",
            label
        )));
    }

    Ok(())
}

/// Validate that a statement description is usable
pub fn validate_description(description: &str) -> ReconResult<()> {
    if description.chars().count() > 500 {
        return Err(ReconError::Validation(
            "Description cannot exceed 500 characters".to_string(),
        ));
    }

    Ok(())
}

/// Stricter validator for imports from untrusted sources
pub struct EnhancedItemValidator;

impl ItemValidator for EnhancedItemValidator {
    fn validate_item(&self, item: &ReconcilableItem) -> ReconResult<()> {
        // Basic validation
        DefaultItemValidator.validate_item(item)?;

        validate_identifier("Item ID", &item.id)?;
        validate_identifier("Account ID", &item.account_id)?;
        if let Some(counterparty_id) = &item.counterparty_id {
            validate_identifier("Counterparty ID", counterparty_id)?;
        }
        validate_description(&item.description)?;

        Ok(())
    }

    fn validate_document(&self, document: &OpenDocument) -> ReconResult<()> {
        DefaultItemValidator.validate_document(document)?;

        validate_identifier("Document ID", &document.id)?;
        validate_identifier("Counterparty ID", &document.counterparty_id)?;
        if document.counterparty_name.trim().is_empty() {
            return Err(ReconError::Validation(format!(
                "Document '{}' needs a counterparty name",
                document.id
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;
    use chrono::NaiveDate;

    fn item(id: &str, description: &str) -> ReconcilableItem {
        ReconcilableItem::new(NewItem::bank_transaction(
            id,
            "bank-1",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            Money::new(1000, Currency::new("EUR").unwrap()),
            description,
        ))
    }

    #[test]
    fn test_identifier_rules() {
        assert!(validate_identifier("Item ID", "tx_2024-01").is_ok());
        assert!(validate_identifier("Item ID", " ").is_err());
        assert!(validate_identifier("Item ID", "tx 1").is_err());
        assert!(validate_identifier("Item ID", &"x".repeat(65)).is_err());
    }

    #[test]
    fn test_enhanced_validator() {
        let validator = EnhancedItemValidator;
        assert!(validator.validate_item(&item("tx1", "Payment")).is_ok());
        assert!(validator.validate_item(&item("tx/1", "Payment")).is_err());
        assert!(validator
            .validate_item(&item("tx1", &"a".repeat(501)))
            .is_err());
    }

    #[test]
    fn test_description_limit_counts_characters() {
        // 500 two-byte characters are 1000 bytes
        let umlauts = "ü".repeat(500);
        assert!(validate_description(&umlauts).is_ok());
        assert!(DefaultItemValidator.validate_item(&item("tx1", &umlauts)).is_ok());
        assert!(validate_description(&"ü".repeat(501)).is_err());
    }

    #[test]
    fn test_positive_amount() {
        let eur = Currency::new("EUR").unwrap();
        assert!(validate_positive_amount(&Money::new(1, eur.clone())).is_ok());
        assert!(matches!(
            validate_positive_amount(&Money::zero(eur)),
            Err(ReconError::InvalidAmount(_))
        ));
    }
}
