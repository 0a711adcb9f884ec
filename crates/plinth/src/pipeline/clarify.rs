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

use crate::ledger::LedgerStore;

use super::data_models::ValidationOutcome;

const SUGGESTED_NAMES: usize = 10;

/// Builds the user-facing clarification from whatever the validator and
/// disambiguation stages could not resolve on their own.
pub fn compose(
    validation: &ValidationOutcome,
    disambiguation_lines: &[String],
    store: &LedgerStore,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.extend(disambiguation_lines.iter().cloned());

    for field in &validation.missing_fields {
        if let Some(name) = field.strip_prefix("property: ") {
            parts.push(format!(
                "I couldn't find property '{name}'. Available properties include: {}.",
                sample(store.properties())
            ));
        } else if let Some(name) = field.strip_prefix("tenant: ") {
            parts.push(format!(
                "I couldn't find tenant '{name}'. Available tenants include: {}.",
                sample(store.tenants())
            ));
        } else {
            parts.push(format!("Missing: {field}."));
        }
    }

    if parts.is_empty() {
        parts.push("I need more information to process your request.".to_string());
    }
    parts.join(" ")
}

fn sample(names: &[String]) -> String {
    names
        .iter()
        .take(SUGGESTED_NAMES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
