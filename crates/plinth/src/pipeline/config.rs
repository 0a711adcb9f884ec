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

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::PipelineError;

/// Tuning knobs for the resolution pipeline. The reference year used for
/// bare quarters and months is deliberately a config input rather than a
/// constant; "this year"/"last year" resolve against `current_year`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub reference_year: String,
    pub current_year: String,
    pub fuzzy_threshold: f64,
    pub auto_resolve_single_candidate: bool,
    pub suggestion_limit: usize,
    pub breakdown_limit: usize,
    pub history_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reference_year: "2024".to_string(),
            current_year: "2025".to_string(),
            fuzzy_threshold: 0.6,
            auto_resolve_single_candidate: true,
            suggestion_limit: 5,
            breakdown_limit: 10,
            history_window: 3,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        info!(
            reference_year = %config.reference_year,
            fuzzy_threshold = config.fuzzy_threshold,
            "pipeline config loaded"
        );
        Ok(config)
    }

    pub fn previous_year(&self) -> String {
        self.current_year
            .parse::<i32>()
            .map(|y| (y - 1).to_string())
            .unwrap_or_else(|_| self.reference_year.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "reference_year: \"2023\"").unwrap();
        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.reference_year, "2023");
        assert_eq!(config.fuzzy_threshold, 0.6);
        assert_eq!(config.history_window, 3);
    }

    #[test]
    fn previous_year_is_derived_from_current() {
        let config = PipelineConfig::default();
        assert_eq!(config.previous_year(), "2024");
    }
}
