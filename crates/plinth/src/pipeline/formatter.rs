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

use std::sync::Arc;

use tracing::warn;

use crate::llm::{prompts, LlmAdapter};

use super::data_models::{
    FanOutOutcome, Intent, PlReport, QueryResult, RankingReport, TenantReport,
};
use super::error::QueryError;

const SUGGESTED_NAMES: usize = 5;

/// Renders results for the user. Structured results the engine already
/// ranked get deterministic templates; prose-worthy ones go through the
/// language collaborator with a deterministic fallback, so a formatting
/// failure can never fail the turn.
pub struct ResponseFormatter {
    adapter: Arc<dyn LlmAdapter>,
}

impl ResponseFormatter {
    pub fn new(adapter: Arc<dyn LlmAdapter>) -> Self {
        Self { adapter }
    }

    pub async fn render(&self, question: &str, intent: Intent, result: &QueryResult) -> String {
        if let Some(text) = deterministic(result) {
            return text;
        }
        let data = serde_json::to_string(result).unwrap_or_default();
        let prompt = prompts::response_formatting(question, intent, &data);
        match self.adapter.generate_response(&prompt).await {
            Ok(text) => clean(&text),
            Err(e) => {
                warn!("response formatting failed, using template fallback: {e}");
                fallback_prose(result)
            }
        }
    }

    pub fn render_error(&self, error: &QueryError) -> String {
        match error {
            QueryError::NoFinancialData => {
                "No financial data matched those filters. Try a different property, \
                 time period or query."
                    .to_string()
            }
            QueryError::MissingPeriodData { requested, found } => format!(
                "I could only resolve data for {} of the {} requested periods ({}). \
                 A comparison needs at least 2 periods with data.",
                found.len(),
                requested.len(),
                if found.is_empty() {
                    "none found".to_string()
                } else {
                    found.join(", ")
                }
            ),
            QueryError::ConflictingFilters(detail) => {
                format!("Those time filters conflict: {detail}.")
            }
            QueryError::InsufficientProperties {
                provided,
                available,
            } => {
                let mut text = String::from("I need at least 2 valid properties to compare");
                if !provided.is_empty() {
                    text.push_str(&format!(" (got: {})", provided.join(", ")));
                }
                text.push_str(&format!(
                    ". Available properties include: {}.",
                    sample(available)
                ));
                text
            }
            QueryError::UnknownProperty { name, available } => format!(
                "I couldn't find property '{name}'. Available properties include: {}.",
                sample(available)
            ),
            QueryError::UnknownTenant { name, available } => format!(
                "I couldn't find tenant '{name}'. Available tenants include: {}.",
                sample(available)
            ),
            QueryError::MissingRequiredField(field) => {
                format!("I'm missing {field}. Could you be more specific?")
            }
            QueryError::UnsupportedIntent(_) => {
                "I can't help with that kind of question yet. Ask me about P&L figures, \
                 property or period comparisons, tenants, or rankings."
                    .to_string()
            }
        }
    }
}

fn deterministic(result: &QueryResult) -> Option<String> {
    match result {
        QueryResult::PropertyComparison(report) => {
            let ranked = report
                .ranking
                .iter()
                .map(|r| format!("{} ({})", r.property, r.net_profit))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!(
                "Compared {} properties by net profit: {ranked}. Best performer: {}; \
                 worst performer: {}.",
                report.properties.len(),
                report.best_performer,
                report.worst_performer
            ))
        }
        QueryResult::TemporalComparison(report) => {
            let scope = report
                .property
                .as_deref()
                .unwrap_or("the whole portfolio");
            let ranked = report
                .ranking
                .iter()
                .map(|r| format!("{} ({})", r.period, r.net_profit))
                .collect::<Vec<_>>()
                .join(", ");
            let mut text = format!(
                "Net profit for {scope} by period: {ranked}. Best period: {}; worst period: {}.",
                report.best_period, report.worst_period
            );
            if report.periods_found.len() < report.periods_requested.len() {
                text.push_str(&format!(
                    " No data was found for {} of the requested periods.",
                    report.periods_requested.len() - report.periods_found.len()
                ));
            }
            Some(text)
        }
        QueryResult::Ranking(report) => Some(render_ranking(report)),
        QueryResult::List(report) => Some(format!(
            "{} {}: {}.",
            report.count,
            match report.target {
                super::data_models::AnalyticsTarget::Properties => "properties",
                super::data_models::AnalyticsTarget::Tenants => "tenants",
                super::data_models::AnalyticsTarget::ExpenseCategories => "expense categories",
            },
            report.items.join(", ")
        )),
        QueryResult::TenantInfo(report) => Some(render_tenants(report)),
        QueryResult::MultiEntity(report) => {
            let mut lines: Vec<String> = Vec::with_capacity(report.total_queries);
            for entry in &report.results {
                let body = match &entry.outcome {
                    FanOutOutcome::Ok { result } => {
                        deterministic(result).unwrap_or_else(|| fallback_prose(result))
                    }
                    FanOutOutcome::Err { error } => format!("no answer ({error})"),
                };
                lines.push(format!("{}. {} - {body}", entry.index, entry.raw_query));
            }
            Some(lines.join("\n"))
        }
        QueryResult::Pl(_) | QueryResult::Summary(_) => None,
    }
}

fn render_ranking(report: &RankingReport) -> String {
    let metric = match report.metric {
        super::data_models::RankingMetric::Revenue => "revenue",
        super::data_models::RankingMetric::Profit => "net profit",
        super::data_models::RankingMetric::Expenses => "expenses",
    };
    let ranked = report
        .ranking
        .iter()
        .map(|r| format!("{} ({})", r.name, r.value))
        .collect::<Vec<_>>()
        .join(", ");
    let mut text = format!("Ranked by {metric}: {ranked}.");
    if let Some(best) = &report.best {
        text.push_str(&format!(" Leading: {best}."));
    }
    if let Some(aggregate) = report.aggregate {
        text.push_str(&format!(" Aggregate value: {aggregate}."));
    }
    text
}

fn render_tenants(report: &TenantReport) -> String {
    match report {
        TenantReport::PropertyRoster {
            property,
            tenants,
            summary,
            record_count,
        } => format!(
            "{property} hosts {} tenants: {}. Total revenue {}, total expenses {}, \
             net profit {} across {record_count} ledger rows.",
            tenants.len(),
            tenants.join(", "),
            summary.total_revenue,
            summary.total_expenses,
            summary.net_profit
        ),
        TenantReport::TenantFootprint {
            tenant,
            properties,
            total_revenue,
            record_count,
        } => format!(
            "{tenant} appears in {}: {}. Attributable revenue {} across {record_count} \
             ledger rows.",
            if properties.len() == 1 {
                "1 property"
            } else {
                "multiple properties"
            },
            properties.join(", "),
            total_revenue
        ),
    }
}

fn fallback_prose(result: &QueryResult) -> String {
    match result {
        QueryResult::Pl(report) => render_pl(report),
        QueryResult::Summary(summary) => format!(
            "The portfolio holds {} ledger rows across {} properties and {} tenants, \
             covering {}. Total revenue {}, total expenses {}.",
            summary.total_records,
            summary.property_count,
            summary.tenant_count,
            summary.years.join(", "),
            summary.total_revenue,
            summary.total_expenses
        ),
        other => deterministic(other).unwrap_or_else(|| "No answer available.".to_string()),
    }
}

fn render_pl(report: &PlReport) -> String {
    let scope = report.property.as_deref().unwrap_or("the whole portfolio");
    let period = report
        .month
        .as_deref()
        .or(report.quarter.as_deref())
        .or(report.year.as_deref())
        .map(|p| format!(" in {p}"))
        .unwrap_or_default();
    format!(
        "For {scope}{period}: total revenue {}, total expenses {}, net profit {}.",
        report.total_revenue, report.total_expenses, report.net_profit
    )
}

fn clean(text: &str) -> String {
    let no_bold = text.replace("**", "");
    no_bold.trim().to_string()
}

fn sample(names: &[String]) -> String {
    names
        .iter()
        .take(SUGGESTED_NAMES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
