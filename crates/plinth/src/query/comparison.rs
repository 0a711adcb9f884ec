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

use crate::ledger::{sniff_period, LedgerFilter, LedgerStore, PeriodKind};
use crate::pipeline::data_models::{
    ComparisonReport, EntityBag, PeriodEntry, PlSummary, PropertyEntry, RankedPeriod,
    RankedProperty, TemporalReport,
};
use crate::pipeline::error::QueryError;
use crate::pipeline::validator::is_portfolio_alias;

pub fn properties(
    store: &LedgerStore,
    bag: &EntityBag,
    breakdown_limit: usize,
) -> Result<ComparisonReport, QueryError> {
    let requested = bag.properties.as_deref().unwrap_or_default();
    if requested.len() < 2 {
        return Err(QueryError::InsufficientProperties {
            provided: requested.to_vec(),
            available: store.properties().to_vec(),
        });
    }
    let mut entries: Vec<PropertyEntry> = Vec::with_capacity(requested.len());
    for name in requested {
        let filter = LedgerFilter {
            property: Some(name.clone()),
            ..Default::default()
        };
        let aggregate =
            store
                .aggregate(&filter, breakdown_limit)
                .ok_or_else(|| QueryError::UnknownProperty {
                    name: name.clone(),
                    available: store.properties().to_vec(),
                })?;
        entries.push(PropertyEntry {
            property: name.clone(),
            summary: PlSummary {
                total_revenue: aggregate.total_revenue,
                total_expenses: aggregate.total_expenses,
                net_profit: aggregate.net_profit,
            },
            tenants: store.tenants_of(name),
            record_count: aggregate.record_count,
        });
    }

    // Stable sort: ties keep the order the user asked in.
    let mut ranking: Vec<RankedProperty> = entries
        .iter()
        .map(|e| RankedProperty {
            property: e.property.clone(),
            net_profit: e.summary.net_profit,
        })
        .collect();
    ranking.sort_by(|a, b| b.net_profit.cmp(&a.net_profit));

    let best_performer = ranking[0].property.clone();
    let worst_performer = ranking[ranking.len() - 1].property.clone();
    Ok(ComparisonReport {
        properties: entries,
        ranking,
        best_performer,
        worst_performer,
    })
}

pub fn temporal(
    store: &LedgerStore,
    bag: &EntityBag,
    breakdown_limit: usize,
) -> Result<TemporalReport, QueryError> {
    let property = bag
        .first_property()
        .filter(|p| !is_portfolio_alias(p))
        .map(str::to_string);
    let requested = bag.periods.clone().unwrap_or_default();
    if requested.len() < 2 {
        return Err(QueryError::MissingPeriodData {
            requested,
            found: Vec::new(),
        });
    }

    let mut entries: Vec<PeriodEntry> = Vec::new();
    for period in &requested {
        let mut filter = LedgerFilter {
            property: property.clone(),
            ..Default::default()
        };
        match sniff_period(period) {
            Some(PeriodKind::Year) => filter.year = Some(period.clone()),
            Some(PeriodKind::Quarter) => filter.quarter = Some(period.clone()),
            Some(PeriodKind::Month) => filter.month = Some(period.clone()),
            None => continue,
        }
        // Periods with no rows are dropped from the ranking; the report
        // still shows requested vs found so the gap is visible.
        if let Some(aggregate) = store.aggregate(&filter, breakdown_limit) {
            entries.push(PeriodEntry {
                period: period.clone(),
                summary: PlSummary {
                    total_revenue: aggregate.total_revenue,
                    total_expenses: aggregate.total_expenses,
                    net_profit: aggregate.net_profit,
                },
            });
        }
    }

    let found: Vec<String> = entries.iter().map(|e| e.period.clone()).collect();
    if found.len() < 2 {
        return Err(QueryError::MissingPeriodData { requested, found });
    }

    let mut ranking: Vec<RankedPeriod> = entries
        .iter()
        .map(|e| RankedPeriod {
            period: e.period.clone(),
            net_profit: e.summary.net_profit,
        })
        .collect();
    ranking.sort_by(|a, b| b.net_profit.cmp(&a.net_profit));

    let best_period = ranking[0].period.clone();
    let worst_period = ranking[ranking.len() - 1].period.clone();
    Ok(TemporalReport {
        property,
        periods_requested: requested,
        periods_found: found,
        periods: entries,
        ranking,
        best_period,
        worst_period,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerKind, LedgerRow};
    use rust_decimal::Decimal;

    fn row(property: &str, kind: LedgerKind, year: &str, amount: i64) -> LedgerRow {
        LedgerRow {
            property: Some(property.to_string()),
            tenant: Some("Tenant 1".to_string()),
            ledger_type: kind,
            ledger_category: "rent".to_string(),
            ledger_group: String::new(),
            year: year.to_string(),
            quarter: format!("{year}-Q1"),
            month: format!("{year}-M01"),
            amount: Decimal::from(amount),
        }
    }

    fn store() -> LedgerStore {
        LedgerStore::new(vec![
            row("Building 140", LedgerKind::Revenue, "2024", 500),
            row("Building 180", LedgerKind::Revenue, "2024", 900),
            row("Building 180", LedgerKind::Expenses, "2024", -100),
            row("Building 180", LedgerKind::Revenue, "2025", 400),
        ])
    }

    #[test]
    fn comparison_ranks_by_net_profit_descending() {
        let bag = EntityBag {
            properties: Some(vec!["Building 140".into(), "Building 180".into()]),
            ..Default::default()
        };
        let report = properties(&store(), &bag, 10).unwrap();
        assert_eq!(report.best_performer, "Building 180");
        assert_eq!(report.worst_performer, "Building 140");
        assert_eq!(report.ranking[0].net_profit, Decimal::from(1200));
    }

    #[test]
    fn comparison_with_one_property_names_the_deficiency() {
        let bag = EntityBag {
            properties: Some(vec!["Building 180".into()]),
            ..Default::default()
        };
        let err = properties(&store(), &bag, 10).unwrap_err();
        match err {
            QueryError::InsufficientProperties {
                provided,
                available,
            } => {
                assert_eq!(provided, vec!["Building 180".to_string()]);
                assert!(available.contains(&"Building 140".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn temporal_ranking_matches_the_period_profits() {
        let bag = EntityBag {
            properties: Some(vec!["Building 180".into()]),
            periods: Some(vec!["2024".into(), "2025".into()]),
            ..Default::default()
        };
        let report = temporal(&store(), &bag, 10).unwrap();
        assert_eq!(report.best_period, "2024");
        assert_eq!(report.worst_period, "2025");
        assert_eq!(report.periods.len(), report.periods_found.len());
        assert_eq!(report.property.as_deref(), Some("Building 180"));
    }

    #[test]
    fn empty_periods_are_dropped_but_reported() {
        let bag = EntityBag {
            properties: Some(vec!["Building 180".into()]),
            periods: Some(vec!["2024".into(), "2025".into(), "2026".into()]),
            ..Default::default()
        };
        let report = temporal(&store(), &bag, 10).unwrap();
        assert_eq!(report.periods_requested.len(), 3);
        assert_eq!(report.periods_found, vec!["2024", "2025"]);
    }

    #[test]
    fn fewer_than_two_resolved_periods_fail() {
        let bag = EntityBag {
            properties: Some(vec!["Building 180".into()]),
            periods: Some(vec!["2024".into(), "2030".into()]),
            ..Default::default()
        };
        let err = temporal(&store(), &bag, 10).unwrap_err();
        assert!(matches!(err, QueryError::MissingPeriodData { found, .. } if found == vec!["2024"]));
    }

    #[test]
    fn portfolio_temporal_comparison_has_no_property_filter() {
        let bag = EntityBag {
            properties: Some(vec!["PropCo".into()]),
            periods: Some(vec!["2024".into(), "2025".into()]),
            ..Default::default()
        };
        let report = temporal(&store(), &bag, 10).unwrap();
        assert_eq!(report.property, None);
        // Portfolio 2024 includes both buildings.
        assert_eq!(report.ranking[0].net_profit, Decimal::from(1300));
    }
}
