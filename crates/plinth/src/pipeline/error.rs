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

use thiserror::Error;

use super::data_models::Intent;

/// Failures the query engine can report once its input has passed
/// validation. Anything requiring a choice only the user can make never
/// reaches this enum; it is surfaced as a clarification instead.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error("no financial data matched the requested filters")]
    NoFinancialData,
    #[error("could not retrieve data for at least 2 periods")]
    MissingPeriodData {
        requested: Vec<String>,
        found: Vec<String>,
    },
    #[error("conflicting time filters: {0}")]
    ConflictingFilters(String),
    #[error("need at least 2 valid properties for a comparison")]
    InsufficientProperties {
        provided: Vec<String>,
        available: Vec<String>,
    },
    #[error("property '{name}' not found")]
    UnknownProperty { name: String, available: Vec<String> },
    #[error("tenant '{name}' not found")]
    UnknownTenant { name: String, available: Vec<String> },
    #[error("missing required field: {0}")]
    MissingRequiredField(String),
    #[error("unsupported query intent: {0}")]
    UnsupportedIntent(Intent),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Config(#[from] serde_yaml::Error),
}
