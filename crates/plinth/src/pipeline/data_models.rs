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
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ledger::{BreakdownLine, PortfolioSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    TemporalComparison,
    PropertyComparison,
    MultiEntityQuery,
    PlCalculation,
    PropertyDetails,
    TenantInfo,
    AnalyticsQuery,
    GeneralQuery,
    Unsupported,
}

impl Intent {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "temporal_comparison" => Some(Self::TemporalComparison),
            "property_comparison" => Some(Self::PropertyComparison),
            "multi_entity_query" => Some(Self::MultiEntityQuery),
            "pl_calculation" => Some(Self::PlCalculation),
            "property_details" => Some(Self::PropertyDetails),
            "tenant_info" => Some(Self::TenantInfo),
            "analytics_query" => Some(Self::AnalyticsQuery),
            "general_query" => Some(Self::GeneralQuery),
            "unsupported" => Some(Self::Unsupported),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TemporalComparison => "temporal_comparison",
            Self::PropertyComparison => "property_comparison",
            Self::MultiEntityQuery => "multi_entity_query",
            Self::PlCalculation => "pl_calculation",
            Self::PropertyDetails => "property_details",
            Self::TenantInfo => "tenant_info",
            Self::AnalyticsQuery => "analytics_query",
            Self::GeneralQuery => "general_query",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    #[default]
    Low,
}

impl Confidence {
    /// Unknown labels collapse to `Low`; the classifier is not trusted to
    /// stay inside its own enum.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsOp {
    List,
    Max,
    Min,
    Top,
    Bottom,
    Sum,
    Avg,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    #[default]
    Pnl,
    Revenue,
    Expenses,
    RentIncome,
    ParkingIncome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarOrList {
    One(String),
    Many(Vec<String>),
}

impl ScalarOrList {
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::One(v) => Some(v.as_str()),
            Self::Many(vs) => vs.first().map(String::as_str),
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(v) => vec![v.clone()],
            Self::Many(vs) => vs.clone(),
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::One(_) => None,
            Self::Many(vs) => Some(vs),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::Many(_))
    }
}

impl From<&str> for ScalarOrList {
    fn from(v: &str) -> Self {
        Self::One(v.to_string())
    }
}

impl From<Vec<String>> for ScalarOrList {
    fn from(vs: Vec<String>) -> Self {
        Self::Many(vs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuery {
    pub raw_query: String,
    pub entities: EntityBag,
}

/// The parameter bag threaded through the pipeline. Each stage consumes a
/// bag and returns a fresh one; fields a stage does not understand survive
/// in `extra` rather than being dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityBag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenants: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<ScalarOrList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarter: Option<ScalarOrList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<ScalarOrList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periods: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<AnalyticsOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_queries: Option<Vec<SubQuery>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EntityBag {
    pub fn is_empty(&self) -> bool {
        self.properties.is_none()
            && self.tenants.is_none()
            && self.year.is_none()
            && self.quarter.is_none()
            && self.month.is_none()
            && self.periods.is_none()
            && self.operation.is_none()
            && self.metric.is_none()
            && self.sub_queries.is_none()
            && self.extra.is_empty()
    }

    pub fn first_property(&self) -> Option<&str> {
        self.properties
            .as_ref()
            .and_then(|ps| ps.first())
            .map(String::as_str)
    }

    pub fn first_tenant(&self) -> Option<&str> {
        self.tenants
            .as_ref()
            .and_then(|ts| ts.first())
            .map(String::as_str)
    }

    pub fn has_timeframe(&self) -> bool {
        self.year.is_some()
            || self.quarter.is_some()
            || self.month.is_some()
            || self.periods.is_some()
    }

    /// Returns the bag with every time field removed, for "overall" style
    /// follow-ups that must not inherit the previous turn's timeframe.
    pub fn without_timeframes(mut self) -> Self {
        self.year = None;
        self.quarter = None;
        self.month = None;
        self.periods = None;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    #[default]
    Ok,
    Missing,
    Ambiguous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguousEntity {
    pub input: String,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub status: ValidationStatus,
    pub entities: EntityBag,
    pub invalid_entities: BTreeMap<String, Vec<String>>,
    pub missing_fields: Vec<String>,
    pub ambiguous_entities: BTreeMap<String, Vec<AmbiguousEntity>>,
    pub suggestions: BTreeMap<String, Vec<String>>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlSummary {
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub net_profit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlReport {
    pub property: Option<String>,
    pub year: Option<String>,
    pub quarter: Option<String>,
    pub month: Option<String>,
    pub metric: Metric,
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub net_profit: Decimal,
    pub revenue_breakdown: Vec<BreakdownLine>,
    pub expenses_breakdown: Vec<BreakdownLine>,
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub property: String,
    #[serde(flatten)]
    pub summary: PlSummary,
    pub tenants: Vec<String>,
    pub record_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedProperty {
    pub property: String,
    pub net_profit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub properties: Vec<PropertyEntry>,
    pub ranking: Vec<RankedProperty>,
    pub best_performer: String,
    pub worst_performer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodEntry {
    pub period: String,
    #[serde(flatten)]
    pub summary: PlSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPeriod {
    pub period: String,
    pub net_profit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalReport {
    pub property: Option<String>,
    pub periods_requested: Vec<String>,
    pub periods_found: Vec<String>,
    pub periods: Vec<PeriodEntry>,
    pub ranking: Vec<RankedPeriod>,
    pub best_period: String,
    pub worst_period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FanOutOutcome {
    Ok { result: QueryResult },
    Err { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutEntry {
    pub index: usize,
    pub raw_query: String,
    #[serde(flatten)]
    pub outcome: FanOutOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutReport {
    pub total_queries: usize,
    pub results: Vec<FanOutEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsTarget {
    Properties,
    Tenants,
    ExpenseCategories,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    Revenue,
    Profit,
    Expenses,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntity {
    pub name: String,
    pub value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingReport {
    pub target: AnalyticsTarget,
    pub operation: AnalyticsOp,
    pub metric: RankingMetric,
    pub ranking: Vec<RankedEntity>,
    pub best: Option<String>,
    pub worst: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListReport {
    pub target: AnalyticsTarget,
    pub items: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TenantReport {
    PropertyRoster {
        property: String,
        tenants: Vec<String>,
        #[serde(flatten)]
        summary: PlSummary,
        record_count: usize,
    },
    TenantFootprint {
        tenant: String,
        properties: Vec<String>,
        total_revenue: Decimal,
        record_count: usize,
    },
}

/// Result of one query engine run, tagged so the formatter can pick a
/// template without recomputing anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryResult {
    Pl(PlReport),
    PropertyComparison(ComparisonReport),
    TemporalComparison(TemporalReport),
    MultiEntity(FanOutReport),
    Ranking(RankingReport),
    List(ListReport),
    TenantInfo(TenantReport),
    Summary(PortfolioSummary),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_intent_labels_do_not_parse() {
        assert_eq!(Intent::from_label("pl_calculation"), Some(Intent::PlCalculation));
        assert_eq!(Intent::from_label("make_coffee"), None);
    }

    #[test]
    fn unknown_confidence_collapses_to_low() {
        assert_eq!(Confidence::from_label("HIGH"), Confidence::High);
        assert_eq!(Confidence::from_label("certain"), Confidence::Low);
    }

    #[test]
    fn validation_status_orders_by_severity() {
        assert!(ValidationStatus::Ambiguous > ValidationStatus::Missing);
        assert!(ValidationStatus::Missing > ValidationStatus::Ok);
    }

    #[test]
    fn bag_preserves_fields_it_does_not_understand() {
        let parsed: EntityBag = serde_json::from_str(
            r#"{"properties": ["Building 180"], "portfolio_hint": true}"#,
        )
        .unwrap();
        assert_eq!(parsed.first_property(), Some("Building 180"));
        assert_eq!(
            parsed.extra.get("portfolio_hint"),
            Some(&serde_json::json!(true))
        );
        let round_trip = serde_json::to_value(&parsed).unwrap();
        assert_eq!(round_trip["portfolio_hint"], serde_json::json!(true));
    }

    #[test]
    fn scalar_and_list_year_both_deserialize() {
        let one: EntityBag = serde_json::from_str(r#"{"year": "2024"}"#).unwrap();
        assert_eq!(one.year.as_ref().and_then(ScalarOrList::first), Some("2024"));
        let many: EntityBag = serde_json::from_str(r#"{"year": ["2024", "2025"]}"#).unwrap();
        assert!(many.year.as_ref().is_some_and(ScalarOrList::is_list));
    }

    #[test]
    fn query_result_is_tagged_by_type() {
        let result = QueryResult::List(ListReport {
            target: AnalyticsTarget::Tenants,
            items: vec!["Tenant 1".into()],
            count: 1,
        });
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "list");
        assert_eq!(value["target"], "tenants");
    }
}
