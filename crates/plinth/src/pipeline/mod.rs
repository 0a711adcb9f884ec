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

pub mod clarify;
pub mod config;
pub mod data_models;
pub mod dates;
pub mod disambiguation;
pub mod error;
pub mod extractor;
pub mod followup;
pub mod formatter;
pub mod router;
pub mod trace;
pub mod validator;

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::conversation::{ConversationLog, ConversationTurn};
use crate::ledger::LedgerStore;
use crate::llm::LlmAdapter;
use crate::query::QueryEngine;

pub use config::PipelineConfig;
pub use data_models::{
    Confidence, EntityBag, Intent, QueryResult, ValidationOutcome, ValidationStatus,
};
pub use error::{PipelineError, QueryError};
pub use trace::{TraceRecord, TurnTrace};

use dates::DateNormaliser;
use disambiguation::DisambiguationResolver;
use extractor::EntityExtractor;
use followup::FollowUpResolver;
use formatter::ResponseFormatter;
use router::IntentRouter;
use validator::EntityValidator;

/// Workflow states. The graph is static; the only conditional edges leave
/// `Validate` and `Disambiguate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    FollowUp,
    Intent,
    Extraction,
    DateNormalise,
    Validate,
    Query,
    Disambiguate,
    Clarify,
    Format,
    Done,
}

pub fn after_validation(status: ValidationStatus) -> Stage {
    match status {
        ValidationStatus::Ok => Stage::Query,
        ValidationStatus::Missing => Stage::Clarify,
        ValidationStatus::Ambiguous => Stage::Disambiguate,
    }
}

pub fn after_disambiguation(needs_clarification: bool) -> Stage {
    if needs_clarification {
        Stage::Clarify
    } else {
        Stage::Query
    }
}

/// What a presentation layer receives for one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub answer: String,
    pub intent: Intent,
    pub confidence: Confidence,
    pub entities: EntityBag,
    pub trace: TurnTrace,
}

/// Wires the stages into the conditional workflow and records a trace
/// record for every visited state. One instance serves many concurrent
/// turns; all per-turn state lives on the stack of `run_turn`.
pub struct Orchestrator {
    config: PipelineConfig,
    store: Arc<LedgerStore>,
    followup: FollowUpResolver,
    router: IntentRouter,
    extractor: EntityExtractor,
    normaliser: DateNormaliser,
    validator: EntityValidator,
    disambiguator: DisambiguationResolver,
    engine: QueryEngine,
    formatter: ResponseFormatter,
}

struct TurnState {
    question: String,
    intent: Intent,
    confidence: Confidence,
    entities: EntityBag,
    validation: ValidationOutcome,
    clarification_lines: Vec<String>,
    clear_timeframes: bool,
    query_outcome: Option<Result<QueryResult, QueryError>>,
    clarification: Option<String>,
    answer: String,
}

impl Orchestrator {
    pub fn new(
        store: Arc<LedgerStore>,
        adapter: Arc<dyn LlmAdapter>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            followup: FollowUpResolver::new(adapter.clone()),
            router: IntentRouter::new(adapter.clone()),
            extractor: EntityExtractor::new(adapter.clone(), store.properties().to_vec()),
            normaliser: DateNormaliser::new(&config),
            validator: EntityValidator::new(store.clone(), &config),
            disambiguator: DisambiguationResolver,
            engine: QueryEngine::new(store.clone(), &config),
            formatter: ResponseFormatter::new(adapter),
            store,
            config,
        }
    }

    /// Runs a full turn and appends it to the session log.
    pub async fn run_with_log(&self, question: &str, log: &mut ConversationLog) -> TurnReport {
        let report = self.run_turn(question, log).await;
        log.push(ConversationTurn {
            query: question.to_string(),
            intent: report.intent,
            entities: report.entities.clone(),
            response: report.answer.clone(),
        });
        report
    }

    #[instrument(skip(self, history), fields(question_len = question.len()))]
    pub async fn run_turn(&self, question: &str, history: &ConversationLog) -> TurnReport {
        let mut trace = TurnTrace::start();

        if question.trim().is_empty() {
            trace.record(
                "Orchestrator",
                "empty_query_handling",
                json!({ "question": question }),
                json!({ "error": "empty question" }),
                "question was empty or whitespace only",
                std::time::Duration::ZERO,
                false,
                Some("empty question".to_string()),
            );
            return TurnReport {
                answer: "Please ask a question. I can help with P&L figures, property and \
                         period comparisons, tenants, and rankings."
                    .to_string(),
                intent: Intent::GeneralQuery,
                confidence: Confidence::Low,
                entities: EntityBag::default(),
                trace,
            };
        }

        let mut state = TurnState {
            question: question.to_string(),
            intent: Intent::GeneralQuery,
            confidence: Confidence::Low,
            entities: EntityBag::default(),
            validation: ValidationOutcome::default(),
            clarification_lines: Vec::new(),
            clear_timeframes: false,
            query_outcome: None,
            clarification: None,
            answer: String::new(),
        };

        let mut stage = Stage::FollowUp;
        while stage != Stage::Done {
            stage = self.step(stage, &mut state, history, &mut trace).await;
        }

        info!(
            intent = %state.intent,
            path = ?trace.agent_path(),
            "turn completed"
        );
        TurnReport {
            answer: state.answer,
            intent: state.intent,
            confidence: state.confidence,
            entities: state.entities,
            trace,
        }
    }

    async fn step(
        &self,
        stage: Stage,
        state: &mut TurnState,
        history: &ConversationLog,
        trace: &mut TurnTrace,
    ) -> Stage {
        let window = self.config.history_window;
        match stage {
            Stage::FollowUp => {
                let started = Instant::now();
                let outcome = self.followup.resolve(&state.question, history, window).await;
                trace.record(
                    "FollowUpResolver",
                    "resolve_followup",
                    json!({ "question": state.question }),
                    json!({
                        "is_followup": outcome.is_followup,
                        "clear_timeframes": outcome.clear_timeframes,
                    }),
                    outcome.notes.clone(),
                    started.elapsed(),
                    true,
                    None,
                );
                state.question = outcome.question;
                state.clear_timeframes = outcome.clear_timeframes;
                Stage::Intent
            }
            Stage::Intent => {
                let started = Instant::now();
                let decision = self.router.classify(&state.question, history, window).await;
                trace.record(
                    "IntentRouter",
                    "classify_intent",
                    json!({ "question": state.question }),
                    json!({
                        "intent": decision.intent,
                        "confidence": decision.confidence,
                    }),
                    decision.reason.clone(),
                    started.elapsed(),
                    true,
                    None,
                );
                state.intent = decision.intent;
                state.confidence = decision.confidence;
                Stage::Extraction
            }
            Stage::Extraction => {
                let started = Instant::now();
                let outcome = self
                    .extractor
                    .extract(&state.question, state.intent, history, window)
                    .await;
                let mut entities = outcome.entities;
                if state.clear_timeframes {
                    entities = entities.without_timeframes();
                }
                trace.record(
                    "EntityExtractor",
                    "extract_entities",
                    json!({ "question": state.question, "intent": state.intent }),
                    serde_json::to_value(&entities).unwrap_or_default(),
                    outcome.notes.clone(),
                    started.elapsed(),
                    true,
                    outcome
                        .fallback_used
                        .then(|| "regex fallback used".to_string()),
                );
                state.entities = entities;
                Stage::DateNormalise
            }
            Stage::DateNormalise => {
                let started = Instant::now();
                let outcome = self.normaliser.normalise(&state.entities, &state.question);
                let mut entities = outcome.entities;
                if state.clear_timeframes {
                    entities = entities.without_timeframes();
                }
                trace.record(
                    "DateNormaliser",
                    "normalise_dates",
                    serde_json::to_value(&state.entities).unwrap_or_default(),
                    serde_json::to_value(&entities).unwrap_or_default(),
                    outcome.notes.clone(),
                    started.elapsed(),
                    outcome.ambiguous_dates.is_empty(),
                    (!outcome.ambiguous_dates.is_empty())
                        .then(|| format!("ambiguous dates: {}", outcome.ambiguous_dates.join(", "))),
                );
                state.entities = entities;
                Stage::Validate
            }
            Stage::Validate => {
                let started = Instant::now();
                let outcome = self.validator.validate(state.intent, &state.entities);
                trace.record(
                    "EntityValidator",
                    "validate_entities",
                    json!({ "intent": state.intent }),
                    json!({ "status": outcome.status }),
                    outcome.notes.clone(),
                    started.elapsed(),
                    true,
                    None,
                );
                // On success the corrected bag flows on; on ambiguity the
                // pre-validation bag is kept so the resolver can substitute
                // candidates into it.
                if outcome.status == ValidationStatus::Ok {
                    state.entities = outcome.entities.clone();
                }
                let next = after_validation(outcome.status);
                state.validation = outcome;
                next
            }
            Stage::Disambiguate => {
                let started = Instant::now();
                let outcome = self
                    .disambiguator
                    .resolve(&state.entities, &state.validation.ambiguous_entities);
                trace.record(
                    "DisambiguationResolver",
                    "disambiguate",
                    serde_json::to_value(&state.validation.ambiguous_entities).unwrap_or_default(),
                    json!({ "resolved": !outcome.needs_clarification }),
                    outcome.notes.clone(),
                    started.elapsed(),
                    true,
                    None,
                );
                if !outcome.needs_clarification {
                    state.entities = outcome.entities;
                }
                state.clarification_lines = outcome.clarification_lines;
                after_disambiguation(outcome.needs_clarification)
            }
            Stage::Clarify => {
                let started = Instant::now();
                let message = clarify::compose(
                    &state.validation,
                    &state.clarification_lines,
                    &self.store,
                );
                trace.record(
                    "ClarificationBuilder",
                    "request_clarification",
                    json!({ "missing": state.validation.missing_fields }),
                    json!({ "message": message }),
                    "user input required before the query can run",
                    started.elapsed(),
                    true,
                    None,
                );
                state.clarification = Some(message);
                Stage::Format
            }
            Stage::Query => {
                let started = Instant::now();
                let outcome = self
                    .engine
                    .run(state.intent, &state.entities, &state.question);
                trace.record(
                    "QueryEngine",
                    "execute_query",
                    json!({ "intent": state.intent }),
                    match &outcome {
                        Ok(result) => serde_json::to_value(result).unwrap_or_default(),
                        Err(e) => json!({ "error": e.to_string() }),
                    },
                    match &outcome {
                        Ok(_) => "query executed".to_string(),
                        Err(e) => format!("query failed: {e}"),
                    },
                    started.elapsed(),
                    outcome.is_ok(),
                    outcome.as_ref().err().map(ToString::to_string),
                );
                state.query_outcome = Some(outcome);
                Stage::Format
            }
            Stage::Format => {
                let started = Instant::now();
                let answer = if let Some(clarification) = &state.clarification {
                    clarification.clone()
                } else {
                    match &state.query_outcome {
                        Some(Ok(result)) => {
                            self.formatter
                                .render(&state.question, state.intent, result)
                                .await
                        }
                        Some(Err(error)) => self.formatter.render_error(error),
                        // Nothing produced an answer; fail the turn softly.
                        None => "An error occurred while processing your question. \
                                 Please try again."
                            .to_string(),
                    }
                };
                trace.record(
                    "ResponseFormatter",
                    "format_response",
                    json!({ "intent": state.intent }),
                    json!({ "response_length": answer.len() }),
                    "response rendered",
                    started.elapsed(),
                    true,
                    None,
                );
                state.answer = answer;
                Stage::Done
            }
            Stage::Done => Stage::Done,
        }
    }
}
