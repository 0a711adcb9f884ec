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

use crate::ledger::{LedgerFilter, LedgerStore};
use crate::pipeline::data_models::{EntityBag, PlSummary, TenantReport};
use crate::pipeline::error::QueryError;
use crate::pipeline::validator::is_portfolio_alias;

/// Two lookup shapes share one intent: "tenants of property P" and
/// "properties of tenant T". A property filter in the bag selects the
/// first shape.
pub fn lookup(
    store: &LedgerStore,
    bag: &EntityBag,
    breakdown_limit: usize,
) -> Result<TenantReport, QueryError> {
    if let Some(property) = bag.first_property() {
        return property_roster(store, property, breakdown_limit);
    }
    let Some(tenant) = bag.first_tenant() else {
        return Err(QueryError::MissingRequiredField(
            "tenant or property".to_string(),
        ));
    };
    tenant_footprint(store, tenant)
}

pub fn property_roster(
    store: &LedgerStore,
    property: &str,
    breakdown_limit: usize,
) -> Result<TenantReport, QueryError> {
    let portfolio = is_portfolio_alias(property);
    let filter = LedgerFilter {
        property: (!portfolio).then(|| property.to_string()),
        ..Default::default()
    };
    let aggregate = store
        .aggregate(&filter, breakdown_limit)
        .ok_or_else(|| QueryError::UnknownProperty {
            name: property.to_string(),
            available: store.properties().to_vec(),
        })?;
    let tenants = if portfolio {
        store.tenants().to_vec()
    } else {
        store.tenants_of(property)
    };
    Ok(TenantReport::PropertyRoster {
        property: property.to_string(),
        tenants,
        summary: PlSummary {
            total_revenue: aggregate.total_revenue,
            total_expenses: aggregate.total_expenses,
            net_profit: aggregate.net_profit,
        },
        record_count: aggregate.record_count,
    })
}

pub fn tenant_footprint(store: &LedgerStore, tenant: &str) -> Result<TenantReport, QueryError> {
    let (total_revenue, record_count) = store.tenant_revenue(tenant);
    if record_count == 0 {
        return Err(QueryError::UnknownTenant {
            name: tenant.to_string(),
            available: store.tenants().to_vec(),
        });
    }
    Ok(TenantReport::TenantFootprint {
        tenant: tenant.to_string(),
        properties: store.properties_of(tenant),
        total_revenue,
        record_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerKind, LedgerRow};
    use rust_decimal::Decimal;

    fn row(property: &str, tenant: &str, kind: LedgerKind, amount: i64) -> LedgerRow {
        LedgerRow {
            property: Some(property.to_string()),
            tenant: Some(tenant.to_string()),
            ledger_type: kind,
            ledger_category: "rent".to_string(),
            ledger_group: String::new(),
            year: "2024".to_string(),
            quarter: "2024-Q1".to_string(),
            month: "2024-M01".to_string(),
            amount: Decimal::from(amount),
        }
    }

    fn store() -> LedgerStore {
        LedgerStore::new(vec![
            row("Building 180", "Tenant 1", LedgerKind::Revenue, 600),
            row("Building 180", "Tenant 2", LedgerKind::Revenue, 300),
            row("Building 140", "Tenant 1", LedgerKind::Revenue, 200),
            row("Building 180", "Tenant 1", LedgerKind::Expenses, -100),
        ])
    }

    #[test]
    fn property_filter_selects_the_roster_shape() {
        let bag = EntityBag {
            properties: Some(vec!["Building 180".to_string()]),
            ..Default::default()
        };
        let report = lookup(&store(), &bag, 10).unwrap();
        match report {
            TenantReport::PropertyRoster {
                property,
                tenants,
                summary,
                ..
            } => {
                assert_eq!(property, "Building 180");
                assert_eq!(tenants, vec!["Tenant 1".to_string(), "Tenant 2".to_string()]);
                assert_eq!(summary.net_profit, Decimal::from(800));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn tenant_only_bag_selects_the_footprint_shape() {
        let bag = EntityBag {
            tenants: Some(vec!["Tenant 1".to_string()]),
            ..Default::default()
        };
        let report = lookup(&store(), &bag, 10).unwrap();
        match report {
            TenantReport::TenantFootprint {
                tenant,
                properties,
                total_revenue,
                record_count,
            } => {
                assert_eq!(tenant, "Tenant 1");
                assert_eq!(
                    properties,
                    vec!["Building 140".to_string(), "Building 180".to_string()]
                );
                assert_eq!(total_revenue, Decimal::from(800));
                assert_eq!(record_count, 3);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn unknown_tenant_reports_the_available_roster() {
        let err = tenant_footprint(&store(), "Tenant 9").unwrap_err();
        assert!(matches!(err, QueryError::UnknownTenant { name, .. } if name == "Tenant 9"));
    }
}
