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

use crate::ledger::{LedgerFilter, LedgerStore};
use crate::pipeline::data_models::{
    AnalyticsOp, AnalyticsTarget, EntityBag, ListReport, QueryResult, RankedEntity, RankingMetric,
    RankingReport, ScalarOrList,
};
use crate::pipeline::error::QueryError;
use crate::pipeline::extractor::detect_operation;

const TOP_N: usize = 3;
const CONTEXT_ROWS: usize = 5;

/// Open-ended ranking/listing analytics. The operation comes from the bag
/// when the extractor recognised one; target and metric are sniffed from
/// the raw question because they rarely survive extraction intact.
pub fn run(
    store: &LedgerStore,
    bag: &EntityBag,
    question: &str,
) -> Result<QueryResult, QueryError> {
    let operation = bag
        .operation
        .or_else(|| detect_operation(question))
        .unwrap_or(AnalyticsOp::List);
    let target = detect_target(question);
    let metric = detect_ranking_metric(question, target);

    if operation == AnalyticsOp::List {
        let items = match target {
            AnalyticsTarget::Properties => store.properties().to_vec(),
            AnalyticsTarget::Tenants => store.tenants().to_vec(),
            AnalyticsTarget::ExpenseCategories => store.expense_categories(),
        };
        return Ok(QueryResult::List(ListReport {
            target,
            count: items.len(),
            items,
        }));
    }

    let time_filter = LedgerFilter {
        year: bag.year.as_ref().and_then(ScalarOrList::first).map(str::to_string),
        quarter: bag
            .quarter
            .as_ref()
            .and_then(ScalarOrList::first)
            .map(str::to_string),
        month: bag
            .month
            .as_ref()
            .and_then(ScalarOrList::first)
            .map(str::to_string),
        ..Default::default()
    };

    let mut ranking = score_candidates(store, target, metric, &time_filter);
    if ranking.is_empty() {
        return Err(QueryError::NoFinancialData);
    }

    let ascending = matches!(operation, AnalyticsOp::Min | AnalyticsOp::Bottom);
    ranking.sort_by(|a, b| {
        if ascending {
            a.value.cmp(&b.value)
        } else {
            b.value.cmp(&a.value)
        }
    });

    let aggregate = match operation {
        AnalyticsOp::Sum => Some(ranking.iter().map(|r| r.value).sum::<Decimal>().round_dp(2)),
        AnalyticsOp::Avg => {
            let sum: Decimal = ranking.iter().map(|r| r.value).sum();
            Some((sum / Decimal::from(ranking.len())).round_dp(2))
        }
        AnalyticsOp::Count => Some(Decimal::from(ranking.len())),
        _ => None,
    };

    match operation {
        AnalyticsOp::Top | AnalyticsOp::Bottom => ranking.truncate(TOP_N),
        AnalyticsOp::Max | AnalyticsOp::Min => ranking.truncate(CONTEXT_ROWS),
        _ => {}
    }

    let best = ranking.first().map(|r| r.name.clone());
    let worst = ranking.last().map(|r| r.name.clone());
    Ok(QueryResult::Ranking(RankingReport {
        target,
        operation,
        metric,
        ranking,
        best,
        worst,
        aggregate,
    }))
}

fn score_candidates(
    store: &LedgerStore,
    target: AnalyticsTarget,
    metric: RankingMetric,
    time_filter: &LedgerFilter,
) -> Vec<RankedEntity> {
    match target {
        AnalyticsTarget::Properties => store
            .properties()
            .iter()
            .filter_map(|name| {
                let filter = LedgerFilter {
                    property: Some(name.clone()),
                    ..time_filter.clone()
                };
                store.aggregate(&filter, 1).map(|agg| RankedEntity {
                    name: name.clone(),
                    value: metric_value(metric, agg.total_revenue, agg.total_expenses, agg.net_profit),
                })
            })
            .collect(),
        AnalyticsTarget::Tenants => store
            .tenants()
            .iter()
            .filter_map(|name| {
                let filter = LedgerFilter {
                    tenant: Some(name.clone()),
                    ..time_filter.clone()
                };
                store.aggregate(&filter, 1).map(|agg| RankedEntity {
                    name: name.clone(),
                    value: metric_value(metric, agg.total_revenue, agg.total_expenses, agg.net_profit),
                })
            })
            .collect(),
        AnalyticsTarget::ExpenseCategories => store
            .expense_categories()
            .iter()
            .map(|category| RankedEntity {
                name: category.clone(),
                value: store.category_expense(category, time_filter),
            })
            .filter(|entry| entry.value != Decimal::ZERO)
            .collect(),
    }
}

fn metric_value(
    metric: RankingMetric,
    revenue: Decimal,
    expenses: Decimal,
    net_profit: Decimal,
) -> Decimal {
    match metric {
        RankingMetric::Revenue => revenue,
        RankingMetric::Expenses => expenses,
        RankingMetric::Profit => net_profit,
    }
}

fn detect_target(question: &str) -> AnalyticsTarget {
    let lower = question.to_lowercase();
    if lower.contains("categor") {
        AnalyticsTarget::ExpenseCategories
    } else if lower.contains("tenant") {
        AnalyticsTarget::Tenants
    } else {
        AnalyticsTarget::Properties
    }
}

fn detect_ranking_metric(question: &str, target: AnalyticsTarget) -> RankingMetric {
    if target == AnalyticsTarget::ExpenseCategories {
        return RankingMetric::Expenses;
    }
    let lower = question.to_lowercase();
    if lower.contains("revenue") || lower.contains("rent") || lower.contains("income") {
        RankingMetric::Revenue
    } else if lower.contains("expense") || lower.contains("cost") {
        RankingMetric::Expenses
    } else {
        RankingMetric::Profit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerKind, LedgerRow};

    fn row(property: &str, tenant: &str, kind: LedgerKind, category: &str, amount: i64) -> LedgerRow {
        LedgerRow {
            property: Some(property.to_string()),
            tenant: Some(tenant.to_string()),
            ledger_type: kind,
            ledger_category: category.to_string(),
            ledger_group: String::new(),
            year: "2024".to_string(),
            quarter: "2024-Q1".to_string(),
            month: "2024-M01".to_string(),
            amount: Decimal::from(amount),
        }
    }

    fn store() -> LedgerStore {
        LedgerStore::new(vec![
            row("Building 140", "Tenant 1", LedgerKind::Revenue, "rent", 500),
            row("Building 180", "Tenant 2", LedgerKind::Revenue, "rent", 900),
            row("Building 17", "Tenant 3", LedgerKind::Revenue, "rent", 100),
            row("Building 180", "Tenant 2", LedgerKind::Expenses, "maintenance", -50),
            row("Building 140", "Tenant 1", LedgerKind::Expenses, "utilities", -200),
        ])
    }

    #[test]
    fn list_operation_returns_the_universe() {
        let bag = EntityBag::default();
        let result = run(&store(), &bag, "list all tenants").unwrap();
        match result {
            QueryResult::List(report) => {
                assert_eq!(report.target, AnalyticsTarget::Tenants);
                assert_eq!(report.count, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn max_ranks_properties_by_profit_descending() {
        let bag = EntityBag {
            operation: Some(AnalyticsOp::Max),
            ..Default::default()
        };
        let result = run(&store(), &bag, "which property made the most profit?").unwrap();
        match result {
            QueryResult::Ranking(report) => {
                assert_eq!(report.best.as_deref(), Some("Building 180"));
                assert_eq!(report.metric, RankingMetric::Profit);
                assert_eq!(report.ranking[0].value, Decimal::from(850));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn min_sorts_ascending() {
        let bag = EntityBag {
            operation: Some(AnalyticsOp::Min),
            ..Default::default()
        };
        let result = run(&store(), &bag, "lowest revenue property").unwrap();
        match result {
            QueryResult::Ranking(report) => {
                assert_eq!(report.best.as_deref(), Some("Building 17"));
                assert_eq!(report.metric, RankingMetric::Revenue);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn expense_categories_rank_by_magnitude() {
        let bag = EntityBag {
            operation: Some(AnalyticsOp::Max),
            ..Default::default()
        };
        let result = run(&store(), &bag, "highest expense category in 2024").unwrap();
        match result {
            QueryResult::Ranking(report) => {
                assert_eq!(report.target, AnalyticsTarget::ExpenseCategories);
                assert_eq!(report.best.as_deref(), Some("utilities"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn average_aggregates_across_the_universe() {
        let bag = EntityBag {
            operation: Some(AnalyticsOp::Avg),
            ..Default::default()
        };
        let result = run(&store(), &bag, "average revenue per property").unwrap();
        match result {
            QueryResult::Ranking(report) => {
                assert_eq!(report.aggregate, Some(Decimal::from(500)));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
