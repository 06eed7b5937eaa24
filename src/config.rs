use serde::{Deserialize, Serialize};

/// bounds applied when validating refinancing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinancingPolicy {
    pub min_installments: u32,
    pub max_installments: u32,
    /// plans requiring more than this upfront are rejected
    pub max_down_payment_percent: u32,
    /// above this, a warning is attached (little deferral left)
    pub high_down_payment_percent: u32,
}

impl Default for RefinancingPolicy {
    fn default() -> Self {
        Self {
            min_installments: 1,
            max_installments: 12,
            max_down_payment_percent: 80,
            high_down_payment_percent: 50,
        }
    }
}

impl RefinancingPolicy {
    pub fn installments_in_range(&self, installments: u32) -> bool {
        installments >= self.min_installments && installments <= self.max_installments
    }

    pub fn down_payment_in_range(&self, percent: u32) -> bool {
        percent <= self.max_down_payment_percent
    }
}

/// configuration for annual quota generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QuotaConfig {
    /// membership subcategories exempt from the monthly quota
    pub exempt_subcategories: Vec<String>,
}

impl QuotaConfig {
    pub fn with_exemptions(subcategories: &[&str]) -> Self {
        Self {
            exempt_subcategories: subcategories.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn is_exempt(&self, subcategory: &str) -> bool {
        self.exempt_subcategories
            .iter()
            .any(|s| s.eq_ignore_ascii_case(subcategory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_bounds() {
        let policy = RefinancingPolicy::default();
        assert!(policy.installments_in_range(1));
        assert!(policy.installments_in_range(12));
        assert!(!policy.installments_in_range(0));
        assert!(!policy.installments_in_range(13));
        assert!(policy.down_payment_in_range(80));
        assert!(!policy.down_payment_in_range(81));
    }

    #[test]
    fn test_exemptions_case_insensitive() {
        let config = QuotaConfig::with_exemptions(&["Vitalicio", "Honorario"]);
        assert!(config.is_exempt("vitalicio"));
        assert!(config.is_exempt("HONORARIO"));
        assert!(!config.is_exempt("Activo"));
    }
}
