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
use std::path::Path;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::model::{LedgerKind, LedgerRow};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakdownLine {
    pub ledger_category: String,
    pub ledger_group: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlAggregate {
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub net_profit: Decimal,
    pub revenue_breakdown: Vec<BreakdownLine>,
    pub expenses_breakdown: Vec<BreakdownLine>,
    pub record_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub property: Option<String>,
    pub tenant: Option<String>,
    pub year: Option<String>,
    pub quarter: Option<String>,
    pub month: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_records: usize,
    pub property_count: usize,
    pub tenant_count: usize,
    pub years: Vec<String>,
    pub earliest_month: Option<String>,
    pub latest_month: Option<String>,
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
}

/// Read-only in-memory ledger table. Rows are immutable once loaded and the
/// store may be shared across concurrent turns without locking.
pub struct LedgerStore {
    rows: Vec<LedgerRow>,
    properties: Vec<String>,
    tenants: Vec<String>,
}

fn ci_eq(column: Option<&str>, value: &str) -> bool {
    column.is_some_and(|c| c.trim().eq_ignore_ascii_case(value.trim()))
}

impl LedgerStore {
    pub fn new(rows: Vec<LedgerRow>) -> Self {
        let mut properties: Vec<String> = rows
            .iter()
            .filter_map(|r| r.property.clone())
            .collect();
        properties.sort();
        properties.dedup();
        let mut tenants: Vec<String> = rows.iter().filter_map(|r| r.tenant.clone()).collect();
        tenants.sort();
        tenants.dedup();
        info!(
            rows = rows.len(),
            properties = properties.len(),
            tenants = tenants.len(),
            "ledger store initialised"
        );
        Self {
            rows,
            properties,
            tenants,
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading ledger file {}", path.display()))?;
        let rows: Vec<LedgerRow> =
            serde_json::from_str(&content).context("parsing ledger rows")?;
        Ok(Self::new(rows))
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn tenants(&self) -> &[String] {
        &self.tenants
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn scan<'a>(&'a self, filter: &'a LedgerFilter) -> impl Iterator<Item = &'a LedgerRow> {
        self.rows.iter().filter(move |row| {
            filter
                .property
                .as_deref()
                .is_none_or(|p| ci_eq(row.property.as_deref(), p))
                && filter
                    .tenant
                    .as_deref()
                    .is_none_or(|t| ci_eq(row.tenant.as_deref(), t))
                && filter.year.as_deref().is_none_or(|y| row.year == y)
                && filter.quarter.as_deref().is_none_or(|q| row.quarter == q)
                && filter.month.as_deref().is_none_or(|m| row.month == m)
        })
    }

    /// Sums revenue against the absolute sum of expenses over the filtered
    /// rows and keeps a magnitude-ordered category breakdown for each side.
    /// Returns `None` when no row survives the filter.
    pub fn aggregate(&self, filter: &LedgerFilter, breakdown_limit: usize) -> Option<PlAggregate> {
        let matched: Vec<&LedgerRow> = self.scan(filter).collect();
        if matched.is_empty() {
            return None;
        }
        let total_revenue: Decimal = matched
            .iter()
            .filter(|r| r.ledger_type == LedgerKind::Revenue)
            .map(|r| r.amount)
            .sum();
        let total_expenses: Decimal = matched
            .iter()
            .filter(|r| r.ledger_type == LedgerKind::Expenses)
            .map(|r| r.amount)
            .sum::<Decimal>()
            .abs();
        let net_profit = total_revenue - total_expenses;
        Some(PlAggregate {
            total_revenue: total_revenue.round_dp(2),
            total_expenses: total_expenses.round_dp(2),
            net_profit: net_profit.round_dp(2),
            revenue_breakdown: breakdown(&matched, LedgerKind::Revenue, breakdown_limit),
            expenses_breakdown: breakdown(&matched, LedgerKind::Expenses, breakdown_limit),
            record_count: matched.len(),
        })
    }

    pub fn tenants_of(&self, property: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .rows
            .iter()
            .filter(|r| ci_eq(r.property.as_deref(), property))
            .filter_map(|r| r.tenant.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn properties_of(&self, tenant: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .rows
            .iter()
            .filter(|r| ci_eq(r.tenant.as_deref(), tenant))
            .filter_map(|r| r.property.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    pub fn tenant_revenue(&self, tenant: &str) -> (Decimal, usize) {
        let matched: Vec<&LedgerRow> = self
            .rows
            .iter()
            .filter(|r| ci_eq(r.tenant.as_deref(), tenant))
            .collect();
        let revenue: Decimal = matched
            .iter()
            .filter(|r| r.ledger_type == LedgerKind::Revenue)
            .map(|r| r.amount)
            .sum();
        (revenue.round_dp(2), matched.len())
    }

    pub fn expense_categories(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .rows
            .iter()
            .filter(|r| r.ledger_type == LedgerKind::Expenses)
            .map(|r| r.ledger_category.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Expense magnitude for one category under the given time filter.
    pub fn category_expense(&self, category: &str, filter: &LedgerFilter) -> Decimal {
        self.scan(filter)
            .filter(|r| r.ledger_type == LedgerKind::Expenses)
            .filter(|r| r.ledger_category.eq_ignore_ascii_case(category))
            .map(|r| r.amount)
            .sum::<Decimal>()
            .abs()
            .round_dp(2)
    }

    pub fn summary(&self) -> PortfolioSummary {
        let mut years: Vec<String> = self.rows.iter().map(|r| r.year.clone()).collect();
        years.sort();
        years.dedup();
        let mut months: Vec<String> = self.rows.iter().map(|r| r.month.clone()).collect();
        months.sort();
        months.dedup();
        let total_revenue: Decimal = self
            .rows
            .iter()
            .filter(|r| r.ledger_type == LedgerKind::Revenue)
            .map(|r| r.amount)
            .sum();
        let total_expenses: Decimal = self
            .rows
            .iter()
            .filter(|r| r.ledger_type == LedgerKind::Expenses)
            .map(|r| r.amount)
            .sum::<Decimal>()
            .abs();
        PortfolioSummary {
            total_records: self.rows.len(),
            property_count: self.properties.len(),
            tenant_count: self.tenants.len(),
            years,
            earliest_month: months.first().cloned(),
            latest_month: months.last().cloned(),
            total_revenue: total_revenue.round_dp(2),
            total_expenses: total_expenses.round_dp(2),
        }
    }
}

fn breakdown(rows: &[&LedgerRow], kind: LedgerKind, limit: usize) -> Vec<BreakdownLine> {
    let mut grouped: BTreeMap<(String, String), Decimal> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.ledger_type == kind) {
        let key = (row.ledger_category.clone(), row.ledger_group.clone());
        let amount = if kind == LedgerKind::Expenses {
            row.amount.abs()
        } else {
            row.amount
        };
        *grouped.entry(key).or_insert(Decimal::ZERO) += amount;
    }
    let mut lines: Vec<BreakdownLine> = grouped
        .into_iter()
        .map(|((category, group), amount)| BreakdownLine {
            ledger_category: category,
            ledger_group: group,
            amount: amount.round_dp(2),
        })
        .collect();
    lines.sort_by(|a, b| b.amount.cmp(&a.amount));
    lines.truncate(limit);
    lines
}
