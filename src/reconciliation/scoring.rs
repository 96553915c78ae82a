//! Individual matching signals, each in [0, 1]

use chrono::NaiveDate;

use crate::config::MatchingConfig;
use crate::money::Money;
use crate::traits::CounterpartyScorer;

/// Legal-form suffixes that carry no identifying signal
const NOISE_TOKENS: &[&str] = &[
    "ag", "bv", "co", "corp", "gmbh", "inc", "kg", "llc", "ltd", "nv", "plc", "sa", "sarl",
    "sas", "spa", "srl", "the",
];

/// 1.0 for an exact match, decaying linearly to 0 at `tolerance` relative
/// difference
pub fn amount_score(unallocated: &Money, amount_due: &Money, tolerance: f64) -> f64 {
    let wanted = unallocated.minor_units();
    let due = amount_due.minor_units();
    if wanted == due {
        return 1.0;
    }
    if wanted <= 0 || unallocated.currency() != amount_due.currency() {
        return 0.0;
    }

    let relative = due.abs_diff(wanted) as f64 / wanted as f64;
    if relative >= tolerance {
        0.0
    } else {
        1.0 - relative / tolerance
    }
}

/// 1.0 on the due date, decaying linearly to 0 at `window_days`
pub fn date_score(booking_date: NaiveDate, due_date: NaiveDate, window_days: i64) -> f64 {
    let gap = (booking_date - due_date).num_days().abs();
    if gap >= window_days {
        0.0
    } else {
        1.0 - gap as f64 / window_days as f64
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|token| token.chars().count() > 1 && !NOISE_TOKENS.contains(&token.as_str()))
        .collect()
}

/// Token-wise Jaro-Winkler similarity between statement text and a
/// counterparty name.
///
/// Each name token is matched to its closest description token; the mean
/// similarity is scaled by `partial_credit` so that free text never earns as
/// much as a linked counterparty.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyNameScorer {
    pub partial_credit: f64,
    pub min_similarity: f64,
}

impl FuzzyNameScorer {
    pub fn new(partial_credit: f64, min_similarity: f64) -> Self {
        Self {
            partial_credit,
            min_similarity,
        }
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self::new(config.fuzzy_partial_credit, config.fuzzy_min_similarity)
    }
}

impl Default for FuzzyNameScorer {
    fn default() -> Self {
        Self::from_config(&MatchingConfig::default())
    }
}

impl CounterpartyScorer for FuzzyNameScorer {
    fn score(&self, description: &str, counterparty_name: &str) -> f64 {
        let name_tokens = tokens(counterparty_name);
        let description_tokens = tokens(description);
        if name_tokens.is_empty() || description_tokens.is_empty() {
            return 0.0;
        }

        let total: f64 = name_tokens
            .iter()
            .map(|name| {
                description_tokens
                    .iter()
                    .map(|word| strsim::jaro_winkler(name, word))
                    .fold(0.0, f64::max)
            })
            .sum();
        let similarity = total / name_tokens.len() as f64;

        if similarity < self.min_similarity {
            0.0
        } else {
            similarity * self.partial_credit
        }
    }
}
