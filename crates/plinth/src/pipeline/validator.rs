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

use crate::ledger::LedgerStore;

use super::config::PipelineConfig;
use super::data_models::{
    AmbiguousEntity, EntityBag, Intent, ScalarOrList, ValidationOutcome, ValidationStatus,
};

const PORTFOLIO_ALIASES: &[&str] = &["propco", "portfolio", "all properties", "all buildings", "all"];

/// Aliases that mean "the whole portfolio" are accepted unconditionally and
/// treated as "no property filter" downstream.
pub fn is_portfolio_alias(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    PORTFOLIO_ALIASES.contains(&lower.as_str())
}

/// Checks every referenced entity against the known universe and classifies
/// the outcome. This is the only place candidates are generated; the
/// disambiguation stage consumes them and never re-derives its own.
pub struct EntityValidator {
    store: Arc<LedgerStore>,
    threshold: f64,
    auto_resolve: bool,
    suggestion_limit: usize,
}

impl EntityValidator {
    pub fn new(store: Arc<LedgerStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            threshold: config.fuzzy_threshold,
            auto_resolve: config.auto_resolve_single_candidate,
            suggestion_limit: config.suggestion_limit,
        }
    }

    /// Known names where one lowercased side contains the other and the
    /// normalised edit-distance ratio clears the threshold, descending by
    /// similarity. An exact case-insensitive match scores 1.0 but does not
    /// short-circuit: sibling names like "Building 18" next to "Building 1"
    /// must still surface as competing candidates.
    pub fn candidates(&self, input: &str, universe: &[String]) -> Vec<String> {
        let needle = input.trim().to_lowercase();
        let mut scored: Vec<(&String, f64)> = universe
            .iter()
            .filter_map(|known| {
                let hay = known.to_lowercase();
                if needle == hay {
                    Some((known, 1.0))
                } else if needle.contains(&hay) || hay.contains(&needle) {
                    let similarity = strsim::normalized_levenshtein(&needle, &hay);
                    (similarity >= self.threshold).then_some((known, similarity))
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(self.suggestion_limit)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn validate(&self, intent: Intent, bag: &EntityBag) -> ValidationOutcome {
        if intent == Intent::TemporalComparison {
            return self.validate_temporal(bag);
        }
        let mut outcome = ValidationOutcome {
            entities: bag.clone(),
            ..Default::default()
        };
        let mut notes: Vec<String> = Vec::new();

        self.check_names(
            bag.properties.as_deref().unwrap_or_default(),
            NameKind::Property,
            &mut outcome,
            &mut notes,
        );
        self.check_names(
            bag.tenants.as_deref().unwrap_or_default(),
            NameKind::Tenant,
            &mut outcome,
            &mut notes,
        );
        self.check_required_fields(intent, bag, &mut outcome, &mut notes);

        if outcome.status != ValidationStatus::Ok {
            // Downstream stages must not act on unverified data.
            outcome.entities = EntityBag::default();
        }
        outcome.notes = if notes.is_empty() {
            "all entities validated".to_string()
        } else {
            notes.join("; ")
        };
        outcome
    }

    fn check_names(
        &self,
        names: &[String],
        kind: NameKind,
        outcome: &mut ValidationOutcome,
        notes: &mut Vec<String>,
    ) {
        let universe = match kind {
            NameKind::Property => self.store.properties(),
            NameKind::Tenant => self.store.tenants(),
        };
        let mut corrected: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if kind == NameKind::Property && is_portfolio_alias(name) {
                notes.push(format!("'{name}' accepted as a portfolio alias"));
                corrected.push(name.clone());
                continue;
            }
            let candidates = self.candidates(name, universe);
            match candidates.len() {
                0 => {
                    outcome.status = outcome.status.max(ValidationStatus::Missing);
                    outcome
                        .invalid_entities
                        .entry(kind.field().to_string())
                        .or_default()
                        .push(name.clone());
                    outcome.missing_fields.push(format!("{}: {name}", kind.label()));
                    outcome
                        .suggestions
                        .entry(kind.field().to_string())
                        .or_insert_with(|| universe.iter().take(10).cloned().collect());
                    notes.push(format!("{} '{name}' not found", kind.label()));
                    corrected.push(name.clone());
                }
                1 if self.auto_resolve => {
                    let canonical = candidates.into_iter().next().unwrap_or_default();
                    if canonical != *name {
                        notes.push(format!("'{name}' auto-corrected to '{canonical}'"));
                    }
                    corrected.push(canonical);
                }
                _ => {
                    outcome.status = outcome.status.max(ValidationStatus::Ambiguous);
                    notes.push(format!(
                        "{} '{name}' is ambiguous ({} matches)",
                        kind.label(),
                        candidates.len()
                    ));
                    outcome
                        .ambiguous_entities
                        .entry(kind.field().to_string())
                        .or_default()
                        .push(AmbiguousEntity {
                            input: name.clone(),
                            candidates,
                        });
                    corrected.push(name.clone());
                }
            }
        }
        if !corrected.is_empty() {
            match kind {
                NameKind::Property => outcome.entities.properties = Some(corrected),
                NameKind::Tenant => outcome.entities.tenants = Some(corrected),
            }
        }
    }

    fn check_required_fields(
        &self,
        intent: Intent,
        bag: &EntityBag,
        outcome: &mut ValidationOutcome,
        notes: &mut Vec<String>,
    ) {
        let mut missing = |outcome: &mut ValidationOutcome, field: &str, note: &str| {
            outcome.status = outcome.status.max(ValidationStatus::Missing);
            outcome.missing_fields.push(field.to_string());
            notes.push(note.to_string());
        };
        match intent {
            Intent::PropertyComparison => {
                let valid = bag
                    .properties
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .filter(|p| {
                        !outcome
                            .invalid_entities
                            .get("properties")
                            .is_some_and(|inv| inv.contains(*p))
                    })
                    .count();
                if valid < 2 {
                    missing(
                        outcome,
                        "properties (need at least 2 properties)",
                        "a comparison needs at least 2 valid properties",
                    );
                }
            }
            Intent::PlCalculation | Intent::PropertyDetails => {
                if bag.properties.as_deref().unwrap_or_default().is_empty() {
                    missing(outcome, "properties", "no property specified");
                }
            }
            Intent::TenantInfo => {
                let has_tenant = !bag.tenants.as_deref().unwrap_or_default().is_empty();
                let has_property = !bag.properties.as_deref().unwrap_or_default().is_empty();
                if !has_tenant && !has_property {
                    missing(
                        outcome,
                        "tenant or property",
                        "a tenant lookup needs a tenant or a property",
                    );
                }
            }
            Intent::MultiEntityQuery => {
                if bag.sub_queries.as_deref().unwrap_or_default().is_empty() {
                    missing(outcome, "sub_queries", "no sub-queries recognised");
                }
            }
            _ => {}
        }
    }

    /// `temporal_comparison` has its own shape: one property (or the
    /// portfolio) and at least two periods, possibly still in list-shaped
    /// year/quarter/month fields at this point.
    fn validate_temporal(&self, bag: &EntityBag) -> ValidationOutcome {
        let mut outcome = ValidationOutcome {
            entities: bag.clone(),
            ..Default::default()
        };
        let mut notes: Vec<String> = Vec::new();

        let has_periods = bag.periods.as_deref().unwrap_or_default().len() >= 2;
        let can_build = [&bag.year, &bag.quarter, &bag.month]
            .into_iter()
            .any(|f| f.as_ref().and_then(ScalarOrList::as_list).unwrap_or_default().len() >= 2);
        if !has_periods && !can_build {
            outcome.status = ValidationStatus::Missing;
            outcome
                .missing_fields
                .push("periods (need at least 2 time periods)".to_string());
            notes.push("a temporal comparison needs at least 2 time periods".to_string());
        }

        let properties = bag.properties.as_deref().unwrap_or_default();
        match properties {
            [] => {
                outcome.status = outcome.status.max(ValidationStatus::Missing);
                outcome.missing_fields.push("property".to_string());
                notes.push("a temporal comparison needs a property or the portfolio".to_string());
            }
            [single] => {
                if !is_portfolio_alias(single) {
                    let candidates = self.candidates(single, self.store.properties());
                    match candidates.len() {
                        0 => {
                            outcome.status = outcome.status.max(ValidationStatus::Missing);
                            outcome
                                .invalid_entities
                                .entry("properties".to_string())
                                .or_default()
                                .push(single.clone());
                            outcome.missing_fields.push(format!("property: {single}"));
                            notes.push(format!("property '{single}' not found"));
                        }
                        1 if self.auto_resolve => {
                            let canonical = candidates.into_iter().next().unwrap_or_default();
                            if canonical != *single {
                                notes.push(format!("'{single}' auto-corrected to '{canonical}'"));
                            }
                            outcome.entities.properties = Some(vec![canonical]);
                        }
                        _ => {
                            outcome.status = outcome.status.max(ValidationStatus::Ambiguous);
                            outcome
                                .ambiguous_entities
                                .entry("properties".to_string())
                                .or_default()
                                .push(AmbiguousEntity {
                                    input: single.clone(),
                                    candidates,
                                });
                            notes.push(format!("property '{single}' is ambiguous"));
                        }
                    }
                }
            }
            _ => {
                outcome.status = outcome.status.max(ValidationStatus::Missing);
                outcome
                    .missing_fields
                    .push("property (exactly one property for a temporal comparison)".to_string());
                notes.push("a temporal comparison works on exactly one property".to_string());
            }
        }

        if outcome.status != ValidationStatus::Ok {
            outcome.entities = EntityBag::default();
        }
        outcome.notes = if notes.is_empty() {
            "temporal comparison entities validated".to_string()
        } else {
            notes.join("; ")
        };
        outcome
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameKind {
    Property,
    Tenant,
}

impl NameKind {
    fn field(self) -> &'static str {
        match self {
            Self::Property => "properties",
            Self::Tenant => "tenants",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Tenant => "tenant",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerKind, LedgerRow};
    use rust_decimal::Decimal;

    fn row(property: &str, tenant: &str) -> LedgerRow {
        LedgerRow {
            property: Some(property.to_string()),
            tenant: Some(tenant.to_string()),
            ledger_type: LedgerKind::Revenue,
            ledger_category: "rent".to_string(),
            ledger_group: String::new(),
            year: "2024".to_string(),
            quarter: "2024-Q1".to_string(),
            month: "2024-M01".to_string(),
            amount: Decimal::from(100),
        }
    }

    fn validator(properties: &[&str]) -> EntityValidator {
        let rows = properties
            .iter()
            .enumerate()
            .map(|(i, p)| row(p, &format!("Tenant {i}")))
            .collect();
        EntityValidator::new(
            Arc::new(LedgerStore::new(rows)),
            &PipelineConfig::default(),
        )
    }

    fn bag_with_properties(names: &[&str]) -> EntityBag {
        EntityBag {
            properties: Some(names.iter().map(ToString::to_string).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn unique_case_insensitive_match_auto_corrects_silently() {
        let v = validator(&["Building 140", "Building 180"]);
        let outcome = v.validate(Intent::PlCalculation, &bag_with_properties(&["building 140"]));
        assert_eq!(outcome.status, ValidationStatus::Ok);
        assert_eq!(
            outcome.entities.properties,
            Some(vec!["Building 140".to_string()])
        );
        assert!(outcome.notes.contains("auto-corrected"));
    }

    #[test]
    fn absent_name_with_no_candidates_is_missing() {
        let v = validator(&["Building 140", "Building 180"]);
        let outcome = v.validate(Intent::PlCalculation, &bag_with_properties(&["Building 999"]));
        assert_eq!(outcome.status, ValidationStatus::Missing);
        assert_eq!(
            outcome.invalid_entities.get("properties"),
            Some(&vec!["Building 999".to_string()])
        );
        assert!(outcome.entities.is_empty());
        assert!(!outcome.suggestions["properties"].is_empty());
    }

    #[test]
    fn sibling_names_make_an_exact_input_ambiguous() {
        let v = validator(&["Building 1", "Building 18"]);
        let outcome = v.validate(Intent::PlCalculation, &bag_with_properties(&["Building 1"]));
        assert_eq!(outcome.status, ValidationStatus::Ambiguous);
        let ambiguous = &outcome.ambiguous_entities["properties"][0];
        assert_eq!(ambiguous.input, "Building 1");
        assert_eq!(
            ambiguous.candidates,
            vec!["Building 1".to_string(), "Building 18".to_string()]
        );
    }

    #[test]
    fn candidates_are_ordered_by_descending_similarity() {
        let v = validator(&["Building 18", "Building 180", "Building 1"]);
        let candidates = v.candidates("Building 18", v.store.properties());
        assert_eq!(candidates[0], "Building 18");
        assert!(candidates.contains(&"Building 180".to_string()));
    }

    #[test]
    fn portfolio_aliases_pass_unconditionally() {
        let v = validator(&["Building 140", "Building 180"]);
        for alias in ["PropCo", "Portfolio", "All Properties", "All Buildings"] {
            let outcome = v.validate(Intent::PlCalculation, &bag_with_properties(&[alias]));
            assert_eq!(outcome.status, ValidationStatus::Ok, "alias {alias}");
        }
    }

    #[test]
    fn comparison_with_one_valid_property_is_missing() {
        let v = validator(&["Building 140", "Building 180"]);
        let outcome = v.validate(
            Intent::PropertyComparison,
            &bag_with_properties(&["Building 140"]),
        );
        assert_eq!(outcome.status, ValidationStatus::Missing);
        assert!(outcome
            .missing_fields
            .iter()
            .any(|f| f.contains("at least 2")));
    }

    #[test]
    fn temporal_comparison_needs_two_periods() {
        let v = validator(&["Building 140"]);
        let bag = EntityBag {
            properties: Some(vec!["Building 140".to_string()]),
            periods: Some(vec!["2024".to_string()]),
            ..Default::default()
        };
        let outcome = v.validate(Intent::TemporalComparison, &bag);
        assert_eq!(outcome.status, ValidationStatus::Missing);
        assert!(outcome.missing_fields[0].contains("periods"));
    }

    #[test]
    fn temporal_comparison_accepts_list_years_before_periods_exist() {
        let v = validator(&["Building 140"]);
        let bag = EntityBag {
            properties: Some(vec!["Building 140".to_string()]),
            year: Some(ScalarOrList::Many(vec!["2024".into(), "2025".into()])),
            ..Default::default()
        };
        let outcome = v.validate(Intent::TemporalComparison, &bag);
        assert_eq!(outcome.status, ValidationStatus::Ok);
    }

    #[test]
    fn ambiguity_outranks_missing_in_the_final_status() {
        let v = validator(&["Building 1", "Building 18"]);
        let outcome = v.validate(
            Intent::PlCalculation,
            &bag_with_properties(&["Building 1", "Building 999"]),
        );
        assert_eq!(outcome.status, ValidationStatus::Ambiguous);
        assert!(outcome.entities.is_empty());
    }
}
