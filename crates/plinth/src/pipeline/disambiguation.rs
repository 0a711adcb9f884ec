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

use std::collections::BTreeMap;

use super::data_models::{AmbiguousEntity, EntityBag, ValidationStatus};

#[derive(Debug, Clone)]
pub struct DisambiguationOutcome {
    pub status: ValidationStatus,
    pub entities: EntityBag,
    pub needs_clarification: bool,
    pub clarification_lines: Vec<String>,
    pub notes: String,
}

/// Consumes the validator's ambiguity map. Items with a single surviving
/// candidate resolve automatically; everything else becomes a clarification
/// question for the user. Candidates are never re-derived here.
#[derive(Debug, Default)]
pub struct DisambiguationResolver;

impl DisambiguationResolver {
    pub fn resolve(
        &self,
        bag: &EntityBag,
        ambiguous: &BTreeMap<String, Vec<AmbiguousEntity>>,
    ) -> DisambiguationOutcome {
        let mut entities = bag.clone();
        let mut lines: Vec<String> = Vec::new();
        let mut notes: Vec<String> = Vec::new();

        for (field, items) in ambiguous {
            let label = match field.as_str() {
                "tenants" => "tenant",
                _ => "property",
            };
            for item in items {
                match item.candidates.as_slice() {
                    [only] => {
                        substitute(&mut entities, field, &item.input, only);
                        notes.push(format!("'{}' resolved to '{only}'", item.input));
                    }
                    candidates => {
                        lines.push(format!(
                            "Which {label} did you mean for '{}'? Options: {}",
                            item.input,
                            candidates.join(", ")
                        ));
                    }
                }
            }
        }

        let needs_clarification = !lines.is_empty();
        DisambiguationOutcome {
            status: if needs_clarification {
                ValidationStatus::Ambiguous
            } else {
                ValidationStatus::Ok
            },
            entities,
            needs_clarification,
            clarification_lines: lines,
            notes: if notes.is_empty() {
                "no auto-resolution possible".to_string()
            } else {
                notes.join("; ")
            },
        }
    }
}

fn substitute(bag: &mut EntityBag, field: &str, input: &str, resolved: &str) {
    let list = match field {
        "tenants" => &mut bag.tenants,
        _ => &mut bag.properties,
    };
    match list {
        Some(values) => {
            let mut replaced = false;
            for value in values.iter_mut() {
                if value.eq_ignore_ascii_case(input) {
                    *value = resolved.to_string();
                    replaced = true;
                }
            }
            if !replaced {
                values.push(resolved.to_string());
            }
        }
        None => *list = Some(vec![resolved.to_string()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ambiguity(
        field: &str,
        input: &str,
        candidates: &[&str],
    ) -> BTreeMap<String, Vec<AmbiguousEntity>> {
        let mut map = BTreeMap::new();
        map.insert(
            field.to_string(),
            vec![AmbiguousEntity {
                input: input.to_string(),
                candidates: candidates.iter().map(ToString::to_string).collect(),
            }],
        );
        map
    }

    #[test]
    fn single_candidate_auto_resolves_into_the_bag() {
        let bag = EntityBag {
            properties: Some(vec!["building 18".to_string()]),
            ..Default::default()
        };
        let outcome = DisambiguationResolver.resolve(
            &bag,
            &ambiguity("properties", "building 18", &["Building 18"]),
        );
        assert_eq!(outcome.status, ValidationStatus::Ok);
        assert!(!outcome.needs_clarification);
        assert_eq!(
            outcome.entities.properties,
            Some(vec!["Building 18".to_string()])
        );
    }

    #[test]
    fn multiple_candidates_produce_a_clarification_question() {
        let bag = EntityBag {
            properties: Some(vec!["Building 1".to_string()]),
            ..Default::default()
        };
        let outcome = DisambiguationResolver.resolve(
            &bag,
            &ambiguity("properties", "Building 1", &["Building 1", "Building 18"]),
        );
        assert_eq!(outcome.status, ValidationStatus::Ambiguous);
        assert!(outcome.needs_clarification);
        assert_eq!(
            outcome.clarification_lines,
            vec![
                "Which property did you mean for 'Building 1'? Options: Building 1, Building 18"
                    .to_string()
            ]
        );
        // The bag keeps the user's original wording until they choose.
        assert_eq!(
            outcome.entities.properties,
            Some(vec!["Building 1".to_string()])
        );
    }
}
