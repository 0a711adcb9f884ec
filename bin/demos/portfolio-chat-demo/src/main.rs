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

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::Context;
use plinth::{
    ConversationLog, HttpLlmAdapter, LedgerStore, LlmAdapter, Orchestrator, PipelineConfig,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    dotenvy::dotenv().ok();
    info!("starting portfolio chat demo");

    let ledger_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PLINTH_LEDGER").ok())
        .context("pass the ledger JSON file as the first argument or set PLINTH_LEDGER")?;
    let store = Arc::new(
        LedgerStore::from_json_file(&ledger_path)
            .with_context(|| format!("failed to load ledger from {ledger_path}"))?,
    );
    info!(
        properties = store.properties().len(),
        tenants = store.tenants().len(),
        rows = store.row_count(),
        "ledger loaded"
    );

    let adapter: Arc<dyn LlmAdapter> = match std::env::var("PLINTH_LLM_PROVIDER").as_deref() {
        Ok("ollama") => Arc::new(HttpLlmAdapter::ollama(
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.1".to_string()),
        )),
        _ => Arc::new(HttpLlmAdapter::anthropic()?),
    };

    let config = match std::env::var("PLINTH_CONFIG") {
        Ok(path) => PipelineConfig::load(&path)?,
        Err(_) => PipelineConfig::default(),
    };
    let orchestrator = Orchestrator::new(store, adapter, config);
    let mut log = ConversationLog::new();
    let session_id = log.session_id();

    println!("Portfolio chat (session {session_id}). Ask about P&L, comparisons, tenants");
    println!("or rankings. Type 'trace' to inspect the last turn, 'exit' to quit.\n");

    let mut last_trace: Option<String> = None;
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        match question {
            "exit" | "quit" => break,
            "trace" => {
                println!("{}", last_trace.as_deref().unwrap_or("no turn yet"));
                continue;
            }
            _ => {}
        }
        let report = orchestrator.run_with_log(question, &mut log).await;
        println!("{}\n", report.answer);
        last_trace = Some(report.trace.summary());
    }

    info!("session {session_id} closed after {} turns", log.len());
    Ok(())
}
