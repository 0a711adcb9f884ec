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

use crate::ledger::{BreakdownLine, LedgerFilter, LedgerStore};
use crate::pipeline::data_models::{EntityBag, Metric, PlReport, ScalarOrList};
use crate::pipeline::error::QueryError;
use crate::pipeline::validator::is_portfolio_alias;

pub fn point(
    store: &LedgerStore,
    bag: &EntityBag,
    breakdown_limit: usize,
) -> Result<PlReport, QueryError> {
    let property = bag
        .first_property()
        .filter(|p| !is_portfolio_alias(p))
        .map(str::to_string);
    let year = bag.year.as_ref().and_then(ScalarOrList::first).map(str::to_string);
    let mut quarter = bag
        .quarter
        .as_ref()
        .and_then(ScalarOrList::first)
        .map(str::to_string);
    let month = bag
        .month
        .as_ref()
        .and_then(ScalarOrList::first)
        .map(str::to_string);

    // The normaliser usually did this already; tolerate a bare quarter.
    if let (Some(q), Some(y)) = (quarter.as_deref(), year.as_deref()) {
        if !q.contains('-') {
            quarter = Some(format!("{y}-{}", q.to_uppercase()));
        }
    }

    check_filter_conflict(quarter.as_deref(), month.as_deref(), year.as_deref())?;

    let filter = LedgerFilter {
        property: property.clone(),
        year: year.clone(),
        quarter: quarter.clone(),
        month: month.clone(),
        ..Default::default()
    };
    let aggregate = store
        .aggregate(&filter, breakdown_limit)
        .ok_or(QueryError::NoFinancialData)?;

    let metric = bag.metric.unwrap_or_default();
    let mut report = PlReport {
        property,
        year,
        quarter,
        month,
        metric,
        total_revenue: aggregate.total_revenue,
        total_expenses: aggregate.total_expenses,
        net_profit: aggregate.net_profit,
        revenue_breakdown: aggregate.revenue_breakdown,
        expenses_breakdown: aggregate.expenses_breakdown,
        record_count: aggregate.record_count,
    };
    narrow_to_metric(&mut report);
    Ok(report)
}

/// A quarter and a month in the same request must agree; a month in Q2
/// combined with an explicit Q1 filter can only return nonsense.
fn check_filter_conflict(
    quarter: Option<&str>,
    month: Option<&str>,
    year: Option<&str>,
) -> Result<(), QueryError> {
    let (Some(quarter), Some(month)) = (quarter, month) else {
        return Ok(());
    };
    let Some(month_number) = month
        .rsplit_once("-M")
        .and_then(|(_, digits)| digits.parse::<u32>().ok())
    else {
        return Ok(());
    };
    let inferred = match month_number {
        1..=3 => "Q1",
        4..=6 => "Q2",
        7..=9 => "Q3",
        _ => "Q4",
    };
    let inferred_full = year.map(|y| format!("{y}-{inferred}"));
    if let Some(inferred_full) = inferred_full {
        if inferred_full != quarter {
            return Err(QueryError::ConflictingFilters(format!(
                "quarter {quarter} and month {month} name different quarters; \
                 specify a single period such as {inferred_full} or {month}"
            )));
        }
    }
    Ok(())
}

/// `metric` narrows the full P&L: expenses-only zeroes the revenue side,
/// revenue-style metrics recompute from the category breakdown. A keyword
/// filter that matches nothing falls back to total revenue by design.
fn narrow_to_metric(report: &mut PlReport) {
    match report.metric {
        Metric::Pnl => {}
        Metric::Expenses => {
            report.total_revenue = Decimal::ZERO;
            report.net_profit = -report.total_expenses;
        }
        Metric::Revenue | Metric::RentIncome | Metric::ParkingIncome => {
            let keyword = match report.metric {
                Metric::RentIncome => Some("rent"),
                Metric::ParkingIncome => Some("parking"),
                _ => None,
            };
            let mut filtered: Decimal = report
                .revenue_breakdown
                .iter()
                .filter(|line| keyword.is_none_or(|k| line_matches(line, k)))
                .map(|line| line.amount)
                .sum();
            if filtered == Decimal::ZERO {
                filtered = report.total_revenue;
            }
            report.total_revenue = filtered.round_dp(2);
            report.net_profit = report.total_revenue;
        }
    }
}

fn line_matches(line: &BreakdownLine, keyword: &str) -> bool {
    line.ledger_category.to_lowercase().contains(keyword)
        || line.ledger_group.to_lowercase().contains(keyword)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerKind, LedgerRow};

    fn row(category: &str, group: &str, kind: LedgerKind, amount: i64) -> LedgerRow {
        LedgerRow {
            property: Some("Building 180".to_string()),
            tenant: Some("Tenant 1".to_string()),
            ledger_type: kind,
            ledger_category: category.to_string(),
            ledger_group: group.to_string(),
            year: "2024".to_string(),
            quarter: "2024-Q1".to_string(),
            month: "2024-M01".to_string(),
            amount: Decimal::from(amount),
        }
    }

    fn store() -> LedgerStore {
        LedgerStore::new(vec![
            row("revenue_rent_taxed", "rental_income", LedgerKind::Revenue, 900),
            row("proceeds_parking_taxed", "other_income", LedgerKind::Revenue, 100),
            row("maintenance", "opex", LedgerKind::Expenses, -300),
        ])
    }

    fn bag() -> EntityBag {
        EntityBag {
            properties: Some(vec!["Building 180".to_string()]),
            year: Some("2024".into()),
            ..Default::default()
        }
    }

    #[test]
    fn net_profit_is_revenue_minus_expense_magnitude() {
        let report = point(&store(), &bag(), 10).unwrap();
        assert_eq!(report.total_revenue, Decimal::from(1000));
        assert_eq!(report.total_expenses, Decimal::from(300));
        assert_eq!(
            report.net_profit,
            report.total_revenue - report.total_expenses
        );
        assert_eq!(report.property.as_deref(), Some("Building 180"));
    }

    #[test]
    fn expenses_metric_zeroes_revenue_and_negates_net() {
        let mut b = bag();
        b.metric = Some(Metric::Expenses);
        let report = point(&store(), &b, 10).unwrap();
        assert_eq!(report.total_revenue, Decimal::ZERO);
        assert_eq!(report.net_profit, Decimal::from(-300));
    }

    #[test]
    fn rent_income_metric_recomputes_from_the_breakdown() {
        let mut b = bag();
        b.metric = Some(Metric::RentIncome);
        let report = point(&store(), &b, 10).unwrap();
        assert_eq!(report.total_revenue, Decimal::from(900));
        assert_eq!(report.net_profit, Decimal::from(900));
    }

    #[test]
    fn keyword_miss_falls_back_to_total_revenue() {
        let rows = vec![row("misc_income", "other", LedgerKind::Revenue, 500)];
        let store = LedgerStore::new(rows);
        let mut b = bag();
        b.metric = Some(Metric::ParkingIncome);
        let report = point(&store, &b, 10).unwrap();
        assert_eq!(report.total_revenue, Decimal::from(500));
    }

    #[test]
    fn portfolio_alias_means_no_property_filter() {
        let mut b = bag();
        b.properties = Some(vec!["PropCo".to_string()]);
        let report = point(&store(), &b, 10).unwrap();
        assert_eq!(report.property, None);
        assert_eq!(report.total_revenue, Decimal::from(1000));
    }

    #[test]
    fn empty_scan_is_no_financial_data() {
        let mut b = bag();
        b.year = Some("2030".into());
        assert_eq!(point(&store(), &b, 10), Err(QueryError::NoFinancialData));
    }

    #[test]
    fn mismatched_quarter_and_month_conflict() {
        let mut b = bag();
        b.quarter = Some("2024-Q1".into());
        b.month = Some("2024-M05".into());
        assert!(matches!(
            point(&store(), &b, 10),
            Err(QueryError::ConflictingFilters(_))
        ));
    }

    #[test]
    fn matching_quarter_and_month_pass() {
        let mut b = bag();
        b.quarter = Some("2024-Q1".into());
        b.month = Some("2024-M01".into());
        assert!(point(&store(), &b, 10).is_ok());
    }
}
