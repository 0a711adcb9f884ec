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

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Revenue,
    Expenses,
}

/// One transaction line. Expense amounts are stored with their original
/// (conventionally negative) sign; aggregation reports expenses as a
/// nonnegative magnitude.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRow {
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub tenant: Option<String>,
    pub ledger_type: LedgerKind,
    pub ledger_category: String,
    #[serde(default)]
    pub ledger_group: String,
    pub year: String,
    pub quarter: String,
    pub month: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    Year,
    Quarter,
    Month,
}

pub fn sniff_period(token: &str) -> Option<PeriodKind> {
    if token.len() == 4 && token.chars().all(|c| c.is_ascii_digit()) {
        Some(PeriodKind::Year)
    } else if token.contains("-Q") {
        Some(PeriodKind::Quarter)
    } else if token.contains("-M") {
        Some(PeriodKind::Month)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_sniffing_covers_all_canonical_shapes() {
        assert_eq!(sniff_period("2024"), Some(PeriodKind::Year));
        assert_eq!(sniff_period("2024-Q3"), Some(PeriodKind::Quarter));
        assert_eq!(sniff_period("2025-M02"), Some(PeriodKind::Month));
        assert_eq!(sniff_period("March"), None);
        assert_eq!(sniff_period("24"), None);
    }
}
