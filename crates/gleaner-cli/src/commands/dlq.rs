//! `gleaner dlq` — dead-letter inspection and replay

use crate::bootstrap::Runtime;
use crate::cli::DlqAction;
use anyhow::{bail, Result};
use gleaner_domain::DeadLetterKind;
use uuid::Uuid;

fn parse_kind(raw: &str) -> Result<DeadLetterKind> {
    match raw {
        "scrape" => Ok(DeadLetterKind::Scrape),
        "extraction" => Ok(DeadLetterKind::Extraction),
        "llm" => Ok(DeadLetterKind::Llm),
        other => bail!("unknown DLQ kind '{other}' (expected scrape, extraction, or llm)"),
    }
}

/// Dispatch a DLQ action
pub async fn run(runtime: Runtime, action: DlqAction) -> Result<()> {
    match action {
        DlqAction::Stats => {
            let stats = runtime.dlq.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        DlqAction::List { kind, limit } => {
            let entries = runtime.dlq.list(parse_kind(&kind)?, limit).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        DlqAction::Retry { id } => retry(&runtime, id).await?,
    }
    Ok(())
}

async fn retry(runtime: &Runtime, id: Uuid) -> Result<()> {
    match runtime.dlq.requeue_llm(&runtime.queue, id).await? {
        Some(request_id) => {
            println!("requeued request {request_id}");
            Ok(())
        }
        None => bail!("no LLM dead letter with id {id}"),
    }
}
