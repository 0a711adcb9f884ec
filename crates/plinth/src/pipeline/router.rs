// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::conversation::ConversationLog;
use crate::llm::{extract_json, prompts, LlmAdapter};
use crate::pipeline::data_models::{Confidence, Intent};

#[derive(Debug, Clone)]
pub struct IntentDecision {
    pub intent: Intent,
    pub confidence: Confidence,
    pub reason: String,
}

impl IntentDecision {
    fn fallback(reason: String) -> Self {
        Self {
            intent: Intent::GeneralQuery,
            confidence: Confidence::Low,
            reason,
        }
    }
}

/// Classifies the question via the external language capability and forces
/// the result back into the closed intent enum. Never fails: every problem
/// degrades to a low-confidence general query.
pub struct IntentRouter {
    adapter: Arc<dyn LlmAdapter>,
}

impl IntentRouter {
    pub fn new(adapter: Arc<dyn LlmAdapter>) -> Self {
        Self { adapter }
    }

    pub async fn classify(
        &self,
        question: &str,
        history: &ConversationLog,
        window: usize,
    ) -> IntentDecision {
        let prompt = prompts::with_history(&prompts::intent_classification(question), history, window);
        let raw = match self.adapter.generate_response(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("intent classification call failed: {e}");
                return IntentDecision::fallback(format!("router fallback after error: {e}"));
            }
        };
        let Some(json_str) = extract_json(&raw) else {
            return IntentDecision::fallback("router returned no parsable JSON".to_string());
        };
        let parsed: Value = match serde_json::from_str(&json_str) {
            Ok(v) => v,
            Err(e) => return IntentDecision::fallback(format!("router returned invalid JSON: {e}")),
        };
        Self::coerce(&parsed)
    }

    fn coerce(parsed: &Value) -> IntentDecision {
        let label = parsed["intent"].as_str().unwrap_or_default();
        let reason = parsed["reason"].as_str().unwrap_or_default().to_string();
        match Intent::from_label(label) {
            Some(intent) => IntentDecision {
                intent,
                confidence: Confidence::from_label(
                    parsed["confidence"].as_str().unwrap_or_default(),
                ),
                reason,
            },
            None => IntentDecision::fallback(format!(
                "intent '{label}' outside the known set, forced to general_query"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_labels_map_to_the_enum() {
        let decision = IntentRouter::coerce(&json!({
            "intent": "temporal_comparison",
            "confidence": "high",
            "reason": "two periods, one property"
        }));
        assert_eq!(decision.intent, Intent::TemporalComparison);
        assert_eq!(decision.confidence, Confidence::High);
    }

    #[test]
    fn unknown_labels_are_coerced_to_general_low() {
        let decision = IntentRouter::coerce(&json!({
            "intent": "weather_forecast",
            "confidence": "high"
        }));
        assert_eq!(decision.intent, Intent::GeneralQuery);
        assert_eq!(decision.confidence, Confidence::Low);
    }

    #[test]
    fn unknown_confidence_is_coerced_to_low() {
        let decision = IntentRouter::coerce(&json!({
            "intent": "pl_calculation",
            "confidence": "absolutely"
        }));
        assert_eq!(decision.intent, Intent::PlCalculation);
        assert_eq!(decision.confidence, Confidence::Low);
    }
}
