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

use tracing::{debug, warn};

use crate::conversation::ConversationLog;
use crate::llm::{prompts, LlmAdapter};

const PHRASE_INDICATORS: &[&str] = &[
    "what about",
    "how about",
    "and for",
    "also for",
    "same for",
    "compare to",
    "compare them",
    "in that case",
    "all of them",
    "as well",
];

const WORD_INDICATORS: &[&str] = &[
    "it", "its", "that", "this", "these", "those", "them", "both", "then", "and", "also", "too",
    "vs", "versus", "compare",
];

const OVERALL_MARKERS: &[&str] = &["overall", "in total", "all time", "altogether"];

const SHORT_QUESTION_TOKENS: usize = 5;

#[derive(Debug, Clone)]
pub struct FollowUpOutcome {
    pub is_followup: bool,
    pub question: String,
    pub clear_timeframes: bool,
    pub notes: String,
}

/// Detects questions that depend on conversational context and rewrites
/// them into self-contained form. Intentionally conservative-but-inclusive:
/// a false positive only costs a rewrite, a false negative loses context.
pub struct FollowUpResolver {
    adapter: Arc<dyn LlmAdapter>,
}

pub fn is_likely_followup(question: &str, history: &ConversationLog) -> bool {
    if history.is_empty() {
        return false;
    }
    let lower = question.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let has_phrase = PHRASE_INDICATORS.iter().any(|p| lower.contains(p));
    let has_word = tokens
        .iter()
        .any(|t| WORD_INDICATORS.contains(t));
    has_phrase || has_word || tokens.len() <= SHORT_QUESTION_TOKENS
}

pub fn wants_overall_scope(question: &str) -> bool {
    let lower = question.to_lowercase();
    OVERALL_MARKERS.iter().any(|m| lower.contains(m))
}

impl FollowUpResolver {
    pub fn new(adapter: Arc<dyn LlmAdapter>) -> Self {
        Self { adapter }
    }

    pub async fn resolve(
        &self,
        question: &str,
        history: &ConversationLog,
        window: usize,
    ) -> FollowUpOutcome {
        let clear_timeframes = wants_overall_scope(question);
        if !is_likely_followup(question, history) {
            return FollowUpOutcome {
                is_followup: false,
                question: question.to_string(),
                clear_timeframes,
                notes: if history.is_empty() {
                    "no conversation history".to_string()
                } else {
                    "question appears self-contained".to_string()
                },
            };
        }
        let history_text = render_history(history, window);
        let prompt = prompts::followup_rewrite(question, &history_text);
        match self.adapter.generate_response(&prompt).await {
            Ok(raw) => {
                let rewritten = clean_rewrite(&raw);
                debug!(original = question, rewritten = %rewritten, "follow-up rewritten");
                FollowUpOutcome {
                    is_followup: true,
                    question: rewritten,
                    clear_timeframes,
                    notes: format!(
                        "follow-up detected, rewritten with context from {} previous turns",
                        history.len().min(window)
                    ),
                }
            }
            Err(e) => {
                // The pipeline must always have some question to route.
                warn!("follow-up rewrite failed, keeping original question: {e}");
                FollowUpOutcome {
                    is_followup: true,
                    question: question.to_string(),
                    clear_timeframes,
                    notes: format!("rewrite failed: {e}"),
                }
            }
        }
    }
}

fn render_history(history: &ConversationLog, window: usize) -> String {
    let mut out = String::new();
    for turn in history.recent(window) {
        out.push_str(&format!("User: {}\n", turn.query));
        let reply: String = turn.response.chars().take(200).collect();
        out.push_str(&format!("Assistant: {reply}\n"));
    }
    out
}

fn clean_rewrite(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    for prefix in [
        "rewritten question:",
        "rewritten query:",
        "self-contained question:",
        "question:",
        "query:",
    ] {
        if text.to_lowercase().starts_with(prefix) {
            text = text[prefix.len()..].trim().to_string();
            break;
        }
    }
    let text = text.trim_matches(|c| c == '"' || c == '\'').trim();
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationTurn;
    use crate::pipeline::data_models::{EntityBag, Intent};

    fn history_with_one_turn() -> ConversationLog {
        let mut log = ConversationLog::new();
        log.push(ConversationTurn {
            query: "What is the P&L for Building 180 in 2024?".to_string(),
            intent: Intent::PlCalculation,
            entities: EntityBag::default(),
            response: "Net profit was 600.".to_string(),
        });
        log
    }

    #[test]
    fn no_history_is_never_a_followup() {
        assert!(!is_likely_followup("And in 2025?", &ConversationLog::new()));
    }

    #[test]
    fn pronouns_and_connectives_trigger_detection() {
        let history = history_with_one_turn();
        assert!(is_likely_followup("And in 2025?", &history));
        assert!(is_likely_followup("compare it to Building 140", &history));
        assert!(is_likely_followup("what about Q2?", &history));
    }

    #[test]
    fn referring_words_match_whole_tokens_only() {
        let history = history_with_one_turn();
        // "profit" contains "it" but is not a referring term.
        assert!(!is_likely_followup(
            "Show the detailed quarterly profit breakdown report for Building 140 during 2024",
            &history
        ));
    }

    #[test]
    fn overall_questions_request_timeframe_clearing() {
        assert!(wants_overall_scope("What is the total P&L overall?"));
        assert!(!wants_overall_scope("What is the P&L in 2024?"));
    }

    #[test]
    fn rewrite_cleanup_strips_prefixes_and_quotes() {
        assert_eq!(
            clean_rewrite("Rewritten question: \"What is the P&L for Building 180 in 2025?\""),
            "What is the P&L for Building 180 in 2025?"
        );
    }
}
