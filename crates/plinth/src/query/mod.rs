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

pub mod analytics;
pub mod comparison;
pub mod pl;
pub mod tenants;

use std::sync::Arc;

use tracing::debug;

use crate::ledger::LedgerStore;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::data_models::{
    EntityBag, FanOutEntry, FanOutOutcome, FanOutReport, Intent, QueryResult,
};
use crate::pipeline::error::QueryError;

/// Executes the aggregation for a validated parameter bag. Pure given the
/// ledger: assumes its input already passed validation, so anything still
/// wrong here is a data gap, not a user error.
pub struct QueryEngine {
    store: Arc<LedgerStore>,
    breakdown_limit: usize,
}

impl QueryEngine {
    pub fn new(store: Arc<LedgerStore>, config: &PipelineConfig) -> Self {
        Self {
            store,
            breakdown_limit: config.breakdown_limit,
        }
    }

    pub fn run(
        &self,
        intent: Intent,
        bag: &EntityBag,
        question: &str,
    ) -> Result<QueryResult, QueryError> {
        debug!(%intent, "running query");
        match intent {
            Intent::PlCalculation => {
                pl::point(&self.store, bag, self.breakdown_limit).map(QueryResult::Pl)
            }
            Intent::PropertyComparison => {
                comparison::properties(&self.store, bag, self.breakdown_limit)
                    .map(QueryResult::PropertyComparison)
            }
            Intent::TemporalComparison => {
                comparison::temporal(&self.store, bag, self.breakdown_limit)
                    .map(QueryResult::TemporalComparison)
            }
            Intent::MultiEntityQuery => self.fan_out(bag).map(QueryResult::MultiEntity),
            Intent::PropertyDetails => {
                let property = bag
                    .first_property()
                    .ok_or_else(|| QueryError::MissingRequiredField("properties".to_string()))?;
                tenants::property_roster(&self.store, property, self.breakdown_limit)
                    .map(QueryResult::TenantInfo)
            }
            Intent::TenantInfo => {
                tenants::lookup(&self.store, bag, self.breakdown_limit).map(QueryResult::TenantInfo)
            }
            Intent::AnalyticsQuery => analytics::run(&self.store, bag, question),
            Intent::GeneralQuery => Ok(QueryResult::Summary(self.store.summary())),
            Intent::Unsupported => Err(QueryError::UnsupportedIntent(intent)),
        }
    }

    /// Routes each sub-query of a compound question through the same
    /// operation-selection logic and keeps the results in asking order.
    fn fan_out(&self, bag: &EntityBag) -> Result<FanOutReport, QueryError> {
        let subs = bag
            .sub_queries
            .as_deref()
            .ok_or_else(|| QueryError::MissingRequiredField("sub_queries".to_string()))?;
        let mut results: Vec<FanOutEntry> = Vec::with_capacity(subs.len());
        for (i, sub) in subs.iter().enumerate() {
            let properties = sub.entities.properties.as_deref().unwrap_or_default();
            let outcome = if properties.len() >= 2 {
                comparison::properties(&self.store, &sub.entities, self.breakdown_limit)
                    .map(QueryResult::PropertyComparison)
            } else if sub.entities.has_timeframe() {
                pl::point(&self.store, &sub.entities, self.breakdown_limit).map(QueryResult::Pl)
            } else if sub.entities.tenants.is_some() {
                tenants::lookup(&self.store, &sub.entities, self.breakdown_limit)
                    .map(QueryResult::TenantInfo)
            } else if let Some(property) = sub.entities.first_property() {
                tenants::property_roster(&self.store, property, self.breakdown_limit)
                    .map(QueryResult::TenantInfo)
            } else {
                Ok(QueryResult::Summary(self.store.summary()))
            };
            results.push(FanOutEntry {
                index: i + 1,
                raw_query: sub.raw_query.clone(),
                outcome: match outcome {
                    Ok(result) => FanOutOutcome::Ok { result },
                    Err(e) => FanOutOutcome::Err {
                        error: e.to_string(),
                    },
                },
            });
        }
        Ok(FanOutReport {
            total_queries: results.len(),
            results,
        })
    }
}
