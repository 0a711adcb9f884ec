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

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One immutable audit record per visited workflow state. Presentation
/// layers may rely on `agent`, `action`, `duration_ms` and `success`; the
/// remaining fields are informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub agent: String,
    pub action: String,
    pub input: Value,
    pub output: Value,
    pub reasoning: String,
    pub duration_ms: u64,
    pub timestamp: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnTrace {
    records: Vec<TraceRecord>,
    #[serde(skip)]
    started: Instant,
}

impl Default for TurnTrace {
    fn default() -> Self {
        Self::start()
    }
}

impl TurnTrace {
    pub fn start() -> Self {
        Self {
            records: Vec::new(),
            started: Instant::now(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        agent: &str,
        action: &str,
        input: Value,
        output: Value,
        reasoning: impl Into<String>,
        duration: Duration,
        success: bool,
        error: Option<String>,
    ) {
        self.records.push(TraceRecord {
            agent: agent.to_string(),
            action: action.to_string(),
            input,
            output,
            reasoning: reasoning.into(),
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now().to_rfc3339(),
            success,
            error,
        });
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn all_succeeded(&self) -> bool {
        self.records.iter().all(|r| r.success)
    }

    pub fn agent_path(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.agent.as_str()).collect()
    }

    pub fn summary(&self) -> String {
        let mut out = String::from("Trace:\n");
        for (i, record) in self.records.iter().enumerate() {
            let status = if record.success { "ok" } else { "failed" };
            let _ = writeln!(
                out,
                "{}. [{status}] {} ({}ms) - {}",
                i + 1,
                record.agent,
                record.duration_ms,
                record.reasoning
            );
        }
        let _ = writeln!(
            out,
            "total: {}ms over {} steps",
            self.total_duration_ms(),
            self.records.len()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn records_accumulate_in_order() {
        let mut trace = TurnTrace::start();
        trace.record(
            "FollowUpResolver",
            "resolve_followup",
            json!({}),
            json!({}),
            "no history",
            Duration::from_millis(1),
            true,
            None,
        );
        trace.record(
            "IntentRouter",
            "classify_intent",
            json!({}),
            json!({}),
            "classified",
            Duration::from_millis(2),
            true,
            None,
        );
        assert_eq!(trace.agent_path(), vec!["FollowUpResolver", "IntentRouter"]);
        assert!(trace.all_succeeded());
    }
}
