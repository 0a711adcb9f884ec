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

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::conversation::ConversationLog;
use crate::llm::{extract_json, prompts, LlmAdapter};
use crate::pipeline::data_models::{AnalyticsOp, EntityBag, Intent, Metric, ScalarOrList, SubQuery};

static BUILDING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bbuilding\s+(\d+)\b").expect("building regex"));
static TENANT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btenant\s+(\d+)\b").expect("tenant regex"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20\d{2})\b").expect("year regex"));
static QUARTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bq([1-4])\b").expect("quarter regex"));
static MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\b",
    )
    .expect("month regex")
});

#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub entities: EntityBag,
    pub fallback_used: bool,
    pub notes: String,
}

/// Pulls the structured parameter bag out of the question via the external
/// extractor capability. Its output is untrusted input: every field is
/// shape-checked, and structural failure degrades to a bounded regex scan.
pub struct EntityExtractor {
    adapter: Arc<dyn LlmAdapter>,
    known_properties: Vec<String>,
}

impl EntityExtractor {
    pub fn new(adapter: Arc<dyn LlmAdapter>, known_properties: Vec<String>) -> Self {
        Self {
            adapter,
            known_properties,
        }
    }

    pub async fn extract(
        &self,
        question: &str,
        intent: Intent,
        history: &ConversationLog,
        window: usize,
    ) -> ExtractionOutcome {
        let prompt = prompts::with_history(
            &prompts::entity_extraction(question, intent, &self.known_properties),
            history,
            window,
        );
        let raw = match self.adapter.generate_response(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("entity extraction call failed: {e}");
                return self.fallback(question, intent, format!("extractor call failed: {e}"));
            }
        };
        let Some(json_str) = extract_json(&raw) else {
            return self.fallback(question, intent, "extractor returned no JSON".to_string());
        };
        let parsed: Value = match serde_json::from_str(&json_str) {
            Ok(v) => v,
            Err(e) => {
                return self.fallback(question, intent, format!("extractor JSON invalid: {e}"))
            }
        };
        match shape_checked_bag(parsed) {
            Some(bag) => {
                let entities = polish(bag, intent, question);
                debug!(?entities, "entities extracted");
                ExtractionOutcome {
                    entities,
                    fallback_used: false,
                    notes: format!("entities extracted for {intent}"),
                }
            }
            None => self.fallback(
                question,
                intent,
                "extractor output failed shape checks".to_string(),
            ),
        }
    }

    fn fallback(&self, question: &str, intent: Intent, cause: String) -> ExtractionOutcome {
        let entities = regex_fallback(question, intent);
        ExtractionOutcome {
            entities,
            fallback_used: true,
            notes: format!("{cause}; regex fallback applied"),
        }
    }
}

/// Coerces loose scalar shapes (numbers for years, bare strings where a
/// list is expected) before deserialising into the typed bag.
fn shape_checked_bag(mut value: Value) -> Option<EntityBag> {
    let map = value.as_object_mut()?;
    for key in ["year", "quarter", "month"] {
        if let Some(v) = map.get_mut(key) {
            coerce_to_string_or_list(v);
        }
    }
    for key in ["properties", "tenants"] {
        if let Some(v) = map.get_mut(key) {
            if v.is_string() {
                *v = Value::Array(vec![v.clone()]);
            }
        }
    }
    serde_json::from_value(value).ok()
}

fn coerce_to_string_or_list(value: &mut Value) {
    match value {
        Value::Number(n) => *value = Value::String(n.to_string()),
        Value::Array(items) => {
            for item in items {
                if let Value::Number(n) = item {
                    *item = Value::String(n.to_string());
                }
            }
        }
        _ => {}
    }
}

fn polish(mut bag: EntityBag, intent: Intent, question: &str) -> EntityBag {
    if let Some(props) = bag.properties.take() {
        let props: Vec<String> = props.into_iter().filter(|p| !p.trim().is_empty()).collect();
        bag.properties = (!props.is_empty()).then_some(props);
    }
    if let Some(tenants) = bag.tenants.take() {
        let tenants: Vec<String> = tenants
            .into_iter()
            .filter(|t| !t.trim().is_empty())
            .collect();
        bag.tenants = (!tenants.is_empty()).then_some(tenants);
    }
    if intent == Intent::TemporalComparison
        && !bag.year.as_ref().is_some_and(ScalarOrList::is_list)
    {
        let years = years_in(question);
        if years.len() >= 2 {
            bag.year = Some(ScalarOrList::Many(years));
        }
    }
    if intent == Intent::AnalyticsQuery {
        if bag.operation.is_none() {
            bag.operation = detect_operation(question);
        }
        if bag.metric.is_none() {
            bag.metric = detect_metric(question);
        }
    }
    if intent == Intent::MultiEntityQuery && bag.sub_queries.is_none() {
        let subs = split_sub_queries(question);
        bag.sub_queries = (!subs.is_empty()).then_some(subs);
    }
    bag
}

/// Bounded, deterministic extraction used when the language collaborator
/// fails or returns something unparsable.
pub fn regex_fallback(question: &str, intent: Intent) -> EntityBag {
    let mut bag = EntityBag::default();
    let properties: Vec<String> = BUILDING_RE
        .captures_iter(question)
        .map(|c| format!("Building {}", &c[1]))
        .collect();
    bag.properties = (!properties.is_empty()).then_some(properties);
    let tenants: Vec<String> = TENANT_RE
        .captures_iter(question)
        .map(|c| format!("Tenant {}", &c[1]))
        .collect();
    bag.tenants = (!tenants.is_empty()).then_some(tenants);
    let years = years_in(question);
    bag.year = match (intent, years.len()) {
        (_, 0) => None,
        (Intent::TemporalComparison, n) if n >= 2 => Some(ScalarOrList::Many(years)),
        _ => Some(ScalarOrList::One(years[0].clone())),
    };
    let quarters: Vec<String> = QUARTER_RE
        .captures_iter(question)
        .map(|c| format!("Q{}", &c[1]))
        .collect();
    bag.quarter = match (intent, quarters.len()) {
        (_, 0) => None,
        (Intent::TemporalComparison, n) if n >= 2 => Some(ScalarOrList::Many(quarters)),
        _ => Some(ScalarOrList::One(quarters[0].clone())),
    };
    if let Some(m) = MONTH_RE.find(question) {
        bag.month = Some(ScalarOrList::One(m.as_str().to_string()));
    }
    if intent == Intent::AnalyticsQuery {
        bag.operation = detect_operation(question);
        bag.metric = detect_metric(question);
    }
    if intent == Intent::MultiEntityQuery {
        let subs = split_sub_queries(question);
        bag.sub_queries = (!subs.is_empty()).then_some(subs);
    }
    bag
}

fn years_in(question: &str) -> Vec<String> {
    let mut years: Vec<String> = YEAR_RE
        .captures_iter(question)
        .map(|c| c[1].to_string())
        .collect();
    years.dedup();
    years
}

pub fn detect_operation(question: &str) -> Option<AnalyticsOp> {
    let lower = question.to_lowercase();
    if lower.contains("top") {
        Some(AnalyticsOp::Top)
    } else if lower.contains("bottom") {
        Some(AnalyticsOp::Bottom)
    } else if lower.contains("highest") || lower.contains("max") || lower.contains("most") {
        Some(AnalyticsOp::Max)
    } else if lower.contains("lowest") || lower.contains("min") || lower.contains("least") {
        Some(AnalyticsOp::Min)
    } else if lower.contains("average") || lower.contains("avg") {
        Some(AnalyticsOp::Avg)
    } else if lower.contains("how many") || lower.contains("count") {
        Some(AnalyticsOp::Count)
    } else if lower.contains("sum") || lower.contains("total") {
        Some(AnalyticsOp::Sum)
    } else if lower.contains("list") || lower.contains("all ") || lower.contains("show") {
        Some(AnalyticsOp::List)
    } else {
        None
    }
}

pub fn detect_metric(question: &str) -> Option<Metric> {
    let lower = question.to_lowercase();
    if lower.contains("parking") {
        Some(Metric::ParkingIncome)
    } else if lower.contains("rent") {
        Some(Metric::RentIncome)
    } else if lower.contains("revenue") || lower.contains("income") {
        Some(Metric::Revenue)
    } else if lower.contains("expense") || lower.contains("cost") {
        Some(Metric::Expenses)
    } else {
        None
    }
}

fn split_sub_queries(question: &str) -> Vec<SubQuery> {
    let parts: Vec<&str> = question
        .split(" and also ")
        .flat_map(|p| p.split(" and "))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .take(4)
        .collect();
    if parts.len() < 2 {
        return Vec::new();
    }
    parts
        .into_iter()
        .map(|part| SubQuery {
            raw_query: part.to_string(),
            entities: regex_fallback(part, Intent::GeneralQuery),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn regex_fallback_finds_the_basic_entities() {
        let bag = regex_fallback(
            "What is the P&L for Building 180 and Tenant 3 in Q1 2024?",
            Intent::PlCalculation,
        );
        assert_eq!(bag.properties, Some(vec!["Building 180".to_string()]));
        assert_eq!(bag.tenants, Some(vec!["Tenant 3".to_string()]));
        assert_eq!(bag.year, Some(ScalarOrList::One("2024".to_string())));
        assert_eq!(bag.quarter, Some(ScalarOrList::One("Q1".to_string())));
    }

    #[test]
    fn temporal_intent_collects_year_lists() {
        let bag = regex_fallback(
            "Compare Building 17 between 2024 and 2025",
            Intent::TemporalComparison,
        );
        assert_eq!(
            bag.year,
            Some(ScalarOrList::Many(vec![
                "2024".to_string(),
                "2025".to_string()
            ]))
        );
    }

    #[test]
    fn shape_checks_coerce_numbers_and_bare_strings() {
        let bag = shape_checked_bag(json!({
            "properties": "Building 180",
            "year": 2024,
            "quarter": null
        }))
        .unwrap();
        assert_eq!(bag.properties, Some(vec!["Building 180".to_string()]));
        assert_eq!(bag.year, Some(ScalarOrList::One("2024".to_string())));
        assert!(bag.quarter.is_none());
    }

    #[test]
    fn analytics_operation_and_metric_are_sniffed() {
        assert_eq!(
            detect_operation("Which property made the most profit?"),
            Some(AnalyticsOp::Max)
        );
        assert_eq!(detect_operation("list all tenants"), Some(AnalyticsOp::List));
        assert_eq!(
            detect_metric("highest rent income"),
            Some(Metric::RentIncome)
        );
        assert_eq!(detect_metric("biggest expense category"), Some(Metric::Expenses));
    }

    #[test]
    fn compound_questions_split_into_sub_queries() {
        let subs = split_sub_queries("PropCo in Q1 2024 and also Building 180 in 2025");
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].raw_query, "PropCo in Q1 2024");
        assert_eq!(
            subs[1].entities.properties,
            Some(vec!["Building 180".to_string()])
        );
    }
}
