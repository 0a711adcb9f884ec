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

use crate::conversation::ConversationLog;
use crate::pipeline::data_models::Intent;

pub fn intent_classification(question: &str) -> String {
    format!(
        r#"You are the intent router of a real-estate portfolio assistant.

Classify the user's question into EXACTLY ONE intent:
1. temporal_comparison  - compare the SAME property across DIFFERENT time periods.
2. property_comparison  - compare DIFFERENT properties.
3. multi_entity_query   - several independent requests combined (AND / ALSO).
4. pl_calculation       - profit, loss, revenue or expenses for ONE entity/timeframe.
5. property_details     - information about ONE property.
6. tenant_info          - information about tenants or occupancy.
7. analytics_query      - list/all, max/min, top/bottom, rankings, sums, averages, counts.
8. general_query        - portfolio related but none of the above.
9. unsupported          - cannot be handled.

Rules, in priority order:
- temporal_comparison needs one property plus at least two time periods and a comparison word.
- multi_entity_query needs 2+ distinct requests joined by "and"/"also".
- analytics_query covers rankings and aggregations across MANY entities; a single
  entity with a single timeframe is pl_calculation even when the question is short.

USER QUESTION:
"{question}"

Return ONLY a JSON object:
{{"intent": "...", "confidence": "high|medium|low", "reason": "short explanation"}}
"#
    )
}

pub fn entity_extraction(question: &str, intent: Intent, known_properties: &[String]) -> String {
    let sample = known_properties
        .iter()
        .take(5)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"You are the entity extractor of a real-estate portfolio assistant.

Extract every entity mentioned in the question EXACTLY AS WRITTEN. Do not
validate and never invent entities. Preserve case, numbers and formatting.

Rules:
- Relative dates stay verbatim: "this year" -> year: "this year".
- For temporal_comparison, multiple years/quarters/months become lists,
  e.g. ["2024", "2025"].
- For analytics_query, also set "operation" (one of list, max, min, top,
  bottom, sum, avg, count) and "metric" (one of pnl, revenue, expenses,
  rent_income, parking_income) when the question implies them.
- For multi_entity_query, split the question into independent parts and
  return them under "sub_queries" as
  [{{"raw_query": "...", "entities": {{...}}}}, ...].
- "tenants of property X" means a property reference, not a tenant;
  "properties of tenant Y" means a tenant reference.

Known properties (reference only): {sample}, ...

QUESTION: "{question}"
INTENT: {intent}

Return ONLY JSON:
{{
  "properties": [..] or null,
  "tenants": [..] or null,
  "year": "..." or [..] or null,
  "quarter": "..." or [..] or null,
  "month": "..." or [..] or null,
  "operation": "..." or null,
  "metric": "..." or null,
  "sub_queries": [..] or null
}}
"#
    )
}

pub fn followup_rewrite(question: &str, history_text: &str) -> String {
    format!(
        r#"You are a follow-up question resolver.

Rewrite the user's current question so it is fully self-contained, using
the conversation below for missing context.

CONVERSATION:
{history_text}

CURRENT QUESTION: "{question}"

Rules:
1. Replace "it", "that", "them" with the entity they refer to.
2. "and what about X" becomes a full question about X, carrying the
   previous timeframe when none is given.
3. "compare to Y" becomes "Compare <previous entity> to Y".
4. Keep the user's intent; add nothing they did not ask for.
5. Output ONLY the rewritten question, nothing else.

REWRITTEN QUESTION:"#
    )
}

pub fn response_formatting(question: &str, intent: Intent, result_json: &str) -> String {
    format!(
        r#"You are the response formatter of a real-estate portfolio assistant.

Write a SHORT, CLEAR answer strictly based on the data below.

Rules:
1. Plain text only, no markdown.
2. At most four sentences.
3. Never invent numbers, properties or tenants.

QUESTION: "{question}"
INTENT: {intent}
DATA: {result_json}

Answer:"#
    )
}

pub fn with_history(prompt: &str, history: &ConversationLog, window: usize) -> String {
    if history.is_empty() {
        return prompt.to_string();
    }
    let mut context = String::from(
        "\n\n=== RECENT CONVERSATION (only for references like 'it' or 'same property') ===\n",
    );
    for turn in history.recent(window) {
        context.push_str(&format!("User: {}\n", turn.query));
        let reply: String = turn.response.chars().take(200).collect();
        context.push_str(&format!("Assistant: {reply}\n"));
    }
    context.push_str("=== END CONVERSATION ===\n");
    format!("{prompt}{context}")
}
