use tracing::{info, warn};

/// Message used when no rule matches the upstream error text.
pub const GENERIC_FAILURE: &str = "Failed to analyze report";

struct Rule {
    name: &'static str,
    applies: fn(&str) -> bool,
    message: &'static str,
}

/// Maps upstream error text to a user-facing message via an ordered rule
/// list. The matching is substring-based against third-party error wording,
/// which is fragile; keeping the rules in one table means wording changes
/// only touch this module. Unmatched errors are logged so new rules can be
/// added from production traffic.
pub struct UpstreamErrorClassifier {
    rules: Vec<Rule>,
}

impl Default for UpstreamErrorClassifier {
    fn default() -> Self {
        UpstreamErrorClassifier {
            rules: vec![
                Rule {
                    name: "api-key",
                    applies: |text| text.contains("API key"),
                    message: "Invalid or missing API key. Please check your Gemini API configuration.",
                },
                Rule {
                    name: "quota",
                    applies: |text| text.contains("quota") || text.contains("limit"),
                    message: "API quota exceeded. Please try again later or upgrade your API plan.",
                },
                Rule {
                    name: "model",
                    applies: |text| text.contains("model"),
                    message: "Model not available. Please check your API key permissions.",
                },
            ],
        }
    }
}

impl UpstreamErrorClassifier {
    pub fn classify(&self, error_text: &str) -> &'static str {
        for rule in &self.rules {
            if (rule.applies)(error_text) {
                info!("Upstream error matched rule '{}'", rule.name);
                return rule.message;
            }
        }
        warn!("Unclassified upstream error: {}", error_text);
        GENERIC_FAILURE
    }
}
