//! Tunable matching and auto-reconciliation settings

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{ReconError, ReconResult};

/// Complete engine configuration, loadable from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub auto_reconcile: AutoReconcileConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> ReconResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| ReconError::Configuration(format!("invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_path(path: impl AsRef<Path>) -> ReconResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ReconError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> ReconResult<()> {
        self.matching.validate()?;
        self.auto_reconcile.validate()
    }
}

/// Relative importance of each matching signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub amount: f64,
    pub counterparty: f64,
    pub date: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            amount: 0.5,
            counterparty: 0.3,
            date: 0.2,
        }
    }
}

impl ScoreWeights {
    /// Weights must lie in [0, 1], sum to 1 and keep amount > counterparty > date
    pub fn validate(&self) -> ReconResult<()> {
        for (name, weight) in [
            ("amount", self.amount),
            ("counterparty", self.counterparty),
            ("date", self.date),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ReconError::Configuration(format!(
                    "{} weight {} is outside [0, 1]",
                    name, weight
                )));
            }
        }

        let sum = self.amount + self.counterparty + self.date;
        if (sum - 1.0).abs() > 1e-9 {
            return Err(ReconError::Configuration(format!(
                "weights must sum to 1, got {}",
                sum
            )));
        }

        if !(self.amount > self.counterparty && self.counterparty > self.date) {
            return Err(ReconError::Configuration(
                "weights must be ordered amount > counterparty > date".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default)]
    pub weights: ScoreWeights,
    /// Relative amount difference at which the amount signal reaches 0
    #[serde(default = "MatchingConfig::default_amount_tolerance")]
    pub amount_tolerance: f64,
    /// Day gap between booking date and due date at which the date signal reaches 0
    #[serde(default = "MatchingConfig::default_date_window_days")]
    pub date_window_days: i64,
    /// Ceiling for counterparty credit earned by free-text similarity alone
    #[serde(default = "MatchingConfig::default_fuzzy_partial_credit")]
    pub fuzzy_partial_credit: f64,
    /// Name similarity below which free text earns no credit
    #[serde(default = "MatchingConfig::default_fuzzy_min_similarity")]
    pub fuzzy_min_similarity: f64,
    /// Only consider documents of the item's linked counterparty, when it has one
    #[serde(default = "MatchingConfig::default_true")]
    pub restrict_to_counterparty: bool,
    /// Match inflows to invoices and outflows to bills only
    #[serde(default = "MatchingConfig::default_true")]
    pub match_direction: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_candidates: Option<usize>,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            amount_tolerance: Self::default_amount_tolerance(),
            date_window_days: Self::default_date_window_days(),
            fuzzy_partial_credit: Self::default_fuzzy_partial_credit(),
            fuzzy_min_similarity: Self::default_fuzzy_min_similarity(),
            restrict_to_counterparty: true,
            match_direction: true,
            max_candidates: None,
        }
    }
}

impl MatchingConfig {
    pub fn default_amount_tolerance() -> f64 {
        0.15
    }

    pub fn default_date_window_days() -> i64 {
        90
    }

    pub fn default_fuzzy_partial_credit() -> f64 {
        0.8
    }

    pub fn default_fuzzy_min_similarity() -> f64 {
        0.85
    }

    fn default_true() -> bool {
        true
    }

    pub fn validate(&self) -> ReconResult<()> {
        self.weights.validate()?;

        if !(self.amount_tolerance > 0.0 && self.amount_tolerance <= 1.0) {
            return Err(ReconError::Configuration(format!(
                "amount tolerance {} is outside (0, 1]",
                self.amount_tolerance
            )));
        }
        if self.date_window_days <= 0 {
            return Err(ReconError::Configuration(format!(
                "date window must be positive, got {} days",
                self.date_window_days
            )));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_partial_credit) {
            return Err(ReconError::Configuration(format!(
                "fuzzy partial credit {} is outside [0, 1]",
                self.fuzzy_partial_credit
            )));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_min_similarity) {
            return Err(ReconError::Configuration(format!(
                "fuzzy minimum similarity {} is outside [0, 1]",
                self.fuzzy_min_similarity
            )));
        }
        if self.max_candidates == Some(0) {
            return Err(ReconError::Configuration(
                "max_candidates must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoReconcileConfig {
    /// Minimum combined score for an unattended match
    #[serde(default = "AutoReconcileConfig::default_accept_threshold")]
    pub accept_threshold: f64,
    /// Required lead of the best candidate over the runner-up
    #[serde(default = "AutoReconcileConfig::default_ambiguity_epsilon")]
    pub ambiguity_epsilon: f64,
}

impl Default for AutoReconcileConfig {
    fn default() -> Self {
        Self {
            accept_threshold: Self::default_accept_threshold(),
            ambiguity_epsilon: Self::default_ambiguity_epsilon(),
        }
    }
}

impl AutoReconcileConfig {
    pub fn default_accept_threshold() -> f64 {
        0.92
    }

    pub fn default_ambiguity_epsilon() -> f64 {
        0.02
    }

    pub fn validate(&self) -> ReconResult<()> {
        if !(self.accept_threshold > 0.0 && self.accept_threshold <= 1.0) {
            return Err(ReconError::Configuration(format!(
                "accept threshold {} is outside (0, 1]",
                self.accept_threshold
            )));
        }
        if !(0.0..1.0).contains(&self.ambiguity_epsilon) {
            return Err(ReconError::Configuration(format!(
                "ambiguity epsilon {} is outside [0, 1)",
                self.ambiguity_epsilon
            )));
        }
        Ok(())
    }
}
