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

use once_cell::sync::Lazy;
use regex::Regex;

use super::config::PipelineConfig;
use super::data_models::{EntityBag, ScalarOrList, ValidationStatus};

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20\d{2})\b").expect("year regex"));
static QUARTER_WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:q([1-4])|(first|second|third|fourth)\s+quarter)\b")
        .expect("quarter regex")
});

const MONTH_NAMES: &[(&str, &str)] = &[
    ("january", "M01"),
    ("jan", "M01"),
    ("february", "M02"),
    ("feb", "M02"),
    ("march", "M03"),
    ("mar", "M03"),
    ("april", "M04"),
    ("apr", "M04"),
    ("may", "M05"),
    ("june", "M06"),
    ("jun", "M06"),
    ("july", "M07"),
    ("jul", "M07"),
    ("august", "M08"),
    ("aug", "M08"),
    ("september", "M09"),
    ("sept", "M09"),
    ("sep", "M09"),
    ("october", "M10"),
    ("oct", "M10"),
    ("november", "M11"),
    ("nov", "M11"),
    ("december", "M12"),
    ("dec", "M12"),
];

#[derive(Debug, Clone)]
pub struct DateOutcome {
    pub status: ValidationStatus,
    pub entities: EntityBag,
    pub ambiguous_dates: Vec<String>,
    pub notes: String,
}

/// Deterministic conversion of year/quarter/month fragments into canonical
/// period tokens (`Q1` + `2024` -> `2024-Q1`, `December` -> `2024-M12`).
/// Pure transform over a copy of the bag; running it twice is a no-op.
pub struct DateNormaliser {
    reference_year: String,
    current_year: String,
    previous_year: String,
}

impl DateNormaliser {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            reference_year: config.reference_year.clone(),
            current_year: config.current_year.clone(),
            previous_year: config.previous_year(),
        }
    }

    pub fn normalise(&self, bag: &EntityBag, question: &str) -> DateOutcome {
        let mut out = bag.clone();
        let mut notes: Vec<String> = Vec::new();
        let mut ambiguous: Vec<String> = Vec::new();

        self.merge_question_dates(&mut out, question, &mut notes);
        self.resolve_relative_years(&mut out, &mut notes);

        let year_context = out
            .year
            .as_ref()
            .and_then(ScalarOrList::first)
            .filter(|y| is_year(y))
            .unwrap_or(self.reference_year.as_str())
            .to_string();

        if let Some(year) = out.year.take() {
            out.year = Some(self.normalise_field(
                year,
                "year",
                |token| is_year(token).then(|| token.to_string()),
                &mut notes,
                &mut ambiguous,
            ));
        }
        if let Some(quarter) = out.quarter.take() {
            out.quarter = Some(self.normalise_field(
                quarter,
                "quarter",
                |token| normalise_quarter(token, &year_context),
                &mut notes,
                &mut ambiguous,
            ));
        }
        if let Some(month) = out.month.take() {
            out.month = Some(self.normalise_field(
                month,
                "month",
                |token| normalise_month(token, &year_context),
                &mut notes,
                &mut ambiguous,
            ));
        }

        // Quarters before months before bare years, each in encounter order.
        let mut periods: Vec<String> = Vec::new();
        for field in [&out.quarter, &out.month, &out.year] {
            if let Some(ScalarOrList::Many(values)) = field {
                periods.extend(values.iter().cloned());
            }
        }
        if !periods.is_empty() {
            out.periods = Some(periods);
        }

        let status = if ambiguous.is_empty() {
            ValidationStatus::Ok
        } else {
            ValidationStatus::Ambiguous
        };
        DateOutcome {
            status,
            entities: out,
            notes: if notes.is_empty() {
                "no date normalisation needed".to_string()
            } else {
                notes.join("; ")
            },
            ambiguous_dates: ambiguous,
        }
    }

    fn normalise_field(
        &self,
        value: ScalarOrList,
        field: &str,
        map: impl Fn(&str) -> Option<String>,
        notes: &mut Vec<String>,
        ambiguous: &mut Vec<String>,
    ) -> ScalarOrList {
        match value {
            ScalarOrList::One(token) => match map(&token) {
                Some(mapped) => {
                    if mapped != token {
                        notes.push(format!("normalised {token} -> {mapped}"));
                    }
                    ScalarOrList::One(mapped)
                }
                None => {
                    ambiguous.push(format!("{field}: {token}"));
                    ScalarOrList::One(token)
                }
            },
            ScalarOrList::Many(tokens) => {
                let mut mapped_tokens = Vec::with_capacity(tokens.len());
                for token in tokens {
                    match map(&token) {
                        Some(mapped) => {
                            if mapped != token {
                                notes.push(format!("normalised {token} -> {mapped}"));
                            }
                            mapped_tokens.push(mapped);
                        }
                        None => ambiguous.push(format!("{field}: {token}")),
                    }
                }
                ScalarOrList::Many(mapped_tokens)
            }
        }
    }

    fn merge_question_dates(&self, out: &mut EntityBag, question: &str, notes: &mut Vec<String>) {
        if question.is_empty() {
            return;
        }
        let lower = question.to_lowercase();
        if out.year.is_none() {
            if let Some(year) = self.year_from_question(&lower, question) {
                notes.push(format!("year taken from question: {year}"));
                out.year = Some(ScalarOrList::One(year));
            }
        }
        if out.quarter.is_none() {
            if lower.contains("last quarter") {
                let token = format!("{}-Q4", self.previous_year);
                notes.push(format!("'last quarter' resolved to {token}"));
                out.quarter = Some(ScalarOrList::One(token));
            } else if let Some(caps) = QUARTER_WORD_RE.captures(question) {
                let number = caps.get(1).map_or_else(
                    || match caps.get(2).map(|m| m.as_str().to_lowercase()).as_deref() {
                        Some("first") => "1",
                        Some("second") => "2",
                        Some("third") => "3",
                        _ => "4",
                    },
                    |m| match m.as_str() {
                        "1" => "1",
                        "2" => "2",
                        "3" => "3",
                        _ => "4",
                    },
                );
                notes.push(format!("quarter taken from question: Q{number}"));
                out.quarter = Some(ScalarOrList::One(format!("Q{number}")));
            }
        }
        if out.month.is_none() {
            for (name, _) in MONTH_NAMES {
                if lower
                    .split(|c: char| !c.is_alphanumeric())
                    .any(|t| t == *name)
                {
                    notes.push(format!("month taken from question: {name}"));
                    out.month = Some(ScalarOrList::One((*name).to_string()));
                    break;
                }
            }
        }
    }

    fn year_from_question(&self, lower: &str, question: &str) -> Option<String> {
        if let Some(caps) = YEAR_RE.captures(question) {
            return Some(caps[1].to_string());
        }
        if lower.contains("this year") || lower.contains("current year") {
            return Some(self.current_year.clone());
        }
        if lower.contains("last year") || lower.contains("previous year") {
            return Some(self.previous_year.clone());
        }
        None
    }

    fn resolve_relative_years(&self, out: &mut EntityBag, notes: &mut Vec<String>) {
        let resolve = |token: &str| -> Option<String> {
            let lower = token.trim().to_lowercase();
            match lower.as_str() {
                "this year" | "current year" => Some(self.current_year.clone()),
                "last year" | "previous year" => Some(self.previous_year.clone()),
                _ => None,
            }
        };
        let Some(year) = out.year.take() else {
            return;
        };
        out.year = Some(match year {
            ScalarOrList::One(token) => match resolve(&token) {
                Some(resolved) => {
                    notes.push(format!("'{token}' resolved to {resolved}"));
                    ScalarOrList::One(resolved)
                }
                None => ScalarOrList::One(token),
            },
            ScalarOrList::Many(tokens) => ScalarOrList::Many(
                tokens
                    .into_iter()
                    .map(|token| match resolve(&token) {
                        Some(resolved) => {
                            notes.push(format!("'{token}' resolved to {resolved}"));
                            resolved
                        }
                        None => token,
                    })
                    .collect(),
            ),
        });
    }
}

fn is_year(token: &str) -> bool {
    token.len() == 4 && token.chars().all(|c| c.is_ascii_digit())
}

fn normalise_quarter(token: &str, year: &str) -> Option<String> {
    let upper = token.trim().to_uppercase();
    if let Some((prefix, suffix)) = upper.split_once('-') {
        return (is_year(prefix) && matches!(suffix, "Q1" | "Q2" | "Q3" | "Q4"))
            .then(|| upper.clone());
    }
    matches!(upper.as_str(), "Q1" | "Q2" | "Q3" | "Q4").then(|| format!("{year}-{upper}"))
}

fn normalise_month(token: &str, year: &str) -> Option<String> {
    let trimmed = token.trim();
    let upper = trimmed.to_uppercase();
    if let Some((prefix, suffix)) = upper.split_once('-') {
        return (is_year(prefix)
            && suffix.len() == 3
            && suffix.starts_with('M')
            && month_number(&suffix[1..]).is_some())
        .then(|| upper.clone());
    }
    if upper.len() == 3 && upper.starts_with('M') {
        return month_number(&upper[1..]).map(|_| format!("{year}-{upper}"));
    }
    if let Ok(n) = trimmed.parse::<u32>() {
        return (1..=12).contains(&n).then(|| format!("{year}-M{n:02}"));
    }
    let lower = trimmed.to_lowercase();
    MONTH_NAMES
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, code)| format!("{year}-{code}"))
}

fn month_number(digits: &str) -> Option<u32> {
    digits
        .parse::<u32>()
        .ok()
        .filter(|n| (1..=12).contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normaliser() -> DateNormaliser {
        DateNormaliser::new(&PipelineConfig::default())
    }

    fn bag_with_quarter(quarter: ScalarOrList, year: Option<ScalarOrList>) -> EntityBag {
        EntityBag {
            quarter: Some(quarter),
            year,
            ..Default::default()
        }
    }

    #[test]
    fn bare_quarter_gets_the_year_prefix() {
        let bag = bag_with_quarter("Q1".into(), Some("2024".into()));
        let outcome = normaliser().normalise(&bag, "");
        assert_eq!(
            outcome.entities.quarter,
            Some(ScalarOrList::One("2024-Q1".to_string()))
        );
        assert_eq!(outcome.status, ValidationStatus::Ok);
    }

    #[test]
    fn bare_quarter_without_year_uses_the_reference_year() {
        let bag = bag_with_quarter("q3".into(), None);
        let outcome = normaliser().normalise(&bag, "");
        assert_eq!(
            outcome.entities.quarter,
            Some(ScalarOrList::One("2024-Q3".to_string()))
        );
    }

    #[test]
    fn normalisation_is_idempotent() {
        let bag = EntityBag {
            quarter: Some("2024-Q1".into()),
            month: Some("2024-M12".into()),
            year: Some("2024".into()),
            ..Default::default()
        };
        let once = normaliser().normalise(&bag, "");
        let twice = normaliser().normalise(&once.entities, "");
        assert_eq!(once.entities, twice.entities);
        assert_eq!(twice.status, ValidationStatus::Ok);
    }

    #[test]
    fn month_names_numbers_and_codes_all_normalise() {
        let n = normaliser();
        assert_eq!(
            normalise_month("December", "2024"),
            Some("2024-M12".to_string())
        );
        assert_eq!(normalise_month("12", "2024"), Some("2024-M12".to_string()));
        assert_eq!(normalise_month("m02", "2025"), Some("2025-M02".to_string()));
        assert_eq!(normalise_month("13", "2024"), None);
        let bag = EntityBag {
            month: Some("dec".into()),
            year: Some("2025".into()),
            ..Default::default()
        };
        let outcome = n.normalise(&bag, "");
        assert_eq!(
            outcome.entities.month,
            Some(ScalarOrList::One("2025-M12".to_string()))
        );
    }

    #[test]
    fn unmappable_tokens_are_collected_not_dropped_silently() {
        let bag = bag_with_quarter("Q7".into(), Some("2024".into()));
        let outcome = normaliser().normalise(&bag, "");
        assert_eq!(outcome.status, ValidationStatus::Ambiguous);
        assert_eq!(outcome.ambiguous_dates, vec!["quarter: Q7".to_string()]);
    }

    #[test]
    fn period_list_orders_quarters_before_months_before_years() {
        let bag = EntityBag {
            quarter: Some(ScalarOrList::Many(vec!["Q1".into(), "Q2".into()])),
            year: Some(ScalarOrList::Many(vec!["2024".into(), "2025".into()])),
            ..Default::default()
        };
        let outcome = normaliser().normalise(&bag, "");
        assert_eq!(
            outcome.entities.periods,
            Some(vec![
                "2024-Q1".to_string(),
                "2024-Q2".to_string(),
                "2024".to_string(),
                "2025".to_string()
            ])
        );
    }

    #[test]
    fn relative_years_resolve_from_config() {
        let bag = EntityBag {
            year: Some("last year".into()),
            ..Default::default()
        };
        let outcome = normaliser().normalise(&bag, "");
        assert_eq!(
            outcome.entities.year,
            Some(ScalarOrList::One("2024".to_string()))
        );
    }

    #[test]
    fn question_text_supplies_missing_dates() {
        let bag = EntityBag::default();
        let outcome = normaliser().normalise(&bag, "expenses for Building 180 in Q2 2025");
        assert_eq!(
            outcome.entities.year,
            Some(ScalarOrList::One("2025".to_string()))
        );
        assert_eq!(
            outcome.entities.quarter,
            Some(ScalarOrList::One("2025-Q2".to_string()))
        );
    }
}
