//! Moderation engine demo binary.
//!
//! This binary is glue, not the engine: it wires the library's `Orchestrator`
//! and `StreamProcessor` to an `InMemorySink`, feeds them either bundled
//! sample records or a JSONL file, and prints the resulting decisions. The
//! broker consumers/producers, REST façade, Postgres persistence, and
//! Prometheus exporter a production deployment would sit this behind are out
//! of scope for this crate (see the crate's design notes) and are not
//! reproduced here.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use moderation_engine::domain::{ChatMessage, Content, ContentKind};
use moderation_engine::ml_scoring::{HeuristicImageAnalyzer, WordListTextScorer};
use moderation_engine::reputation::ReputationEngine;
use moderation_engine::sinks::InMemorySink;
use moderation_engine::triage::TriageService;
use moderation_engine::{ModerationConfig, Orchestrator, StreamProcessor};

#[derive(Parser)]
#[command(name = "moderation-engine", about = "Tiered content-moderation decision engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run Flow A (asynchronous tiered moderation) over bundled samples or a JSONL file.
    FlowA {
        /// Path to a JSONL file of `Content` records; bundled samples are used if omitted.
        #[arg(long)]
        input: Option<String>,
    },
    /// Run Flow B (real-time chat classification) over bundled samples or a JSONL file.
    FlowB {
        /// Path to a JSONL file of `ChatMessage` records; bundled samples are used if omitted.
        #[arg(long)]
        input: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = ModerationConfig::from_env();

    match cli.command {
        Command::FlowA { input } => run_flow_a(config, input).await,
        Command::FlowB { input } => run_flow_b(config, input).await,
    }
}

async fn run_flow_a(config: ModerationConfig, input: Option<String>) -> Result<()> {
    let sink = Arc::new(InMemorySink::new());
    let orchestrator = Orchestrator::new(
        config.clone(),
        Arc::new(ReputationEngine::new(config.reputation_weights)),
        Arc::new(TriageService::new(config.duplicate_cache_capacity)),
        Arc::new(WordListTextScorer::new()),
        Arc::new(HeuristicImageAnalyzer::new()),
        sink.clone(),
        sink.clone(),
    );

    let contents = match input {
        Some(path) => load_jsonl(&path)?,
        None => sample_contents(),
    };

    for content in contents {
        let content_id = content.content_id.clone();
        match orchestrator.moderate(content).await {
            Ok(result) => {
                info!(
                    content_id = %content_id,
                    decision = ?result.decision,
                    severity = ?result.severity,
                    tier = result.tier_reached,
                    processing_ms = result.processing_ms,
                    "flow a decision"
                );
                println!("{}", serde_json::to_string(&result)?);
            }
            Err(err) => {
                info!(content_id = %content_id, error = %err, "flow a dead-lettered");
            }
        }
    }

    for task in sink.review_tasks() {
        println!("{}", serde_json::to_string(&task)?);
    }

    Ok(())
}

async fn run_flow_b(config: ModerationConfig, input: Option<String>) -> Result<()> {
    let sink = Arc::new(InMemorySink::new());
    let processor = StreamProcessor::new(config, sink.clone());

    let messages = match input {
        Some(path) => load_jsonl(&path)?,
        None => sample_chat_messages(),
    };

    for message in messages {
        let result = processor.process(message).await?;
        info!(
            message_id = %result.message_id,
            decision = ?result.decision,
            severity = ?result.severity,
            count_1m = result.count_1m,
            processing_ms = result.processing_ms,
            "flow b decision"
        );
        println!("{}", serde_json::to_string(&result)?);
    }

    Ok(())
}

fn load_jsonl<T: serde::de::DeserializeOwned>(path: &str) -> Result<Vec<T>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {path}"))?;
    std::io::BufReader::new(file)
        .lines()
        .filter(|line| line.as_ref().is_ok_and(|l| !l.trim().is_empty()))
        .map(|line| {
            let line = line?;
            serde_json::from_str(&line).with_context(|| format!("parsing line: {line}"))
        })
        .collect()
}

fn sample_contents() -> Vec<Content> {
    vec![
        Content {
            content_id: "demo-1".into(),
            user_id: "alice".into(),
            content_kind: ContentKind::ForumPost,
            text_content: Some("Great game everyone!".into()),
            image_url: None,
            media_urls: vec![],
            created_at: Utc::now(),
            parent_id: None,
            channel_id: None,
            creator_metadata: None,
        },
        Content {
            content_id: "demo-2".into(),
            user_id: "spammer".into(),
            content_kind: ContentKind::ForumPost,
            text_content: Some("BUY NOW!!! http://bit.ly/xyz http://bit.ly/abc".into()),
            image_url: None,
            media_urls: vec![],
            created_at: Utc::now(),
            parent_id: None,
            channel_id: None,
            creator_metadata: None,
        },
        Content {
            content_id: "demo-3".into(),
            user_id: "borderline-user".into(),
            content_kind: ContentKind::ForumPost,
            text_content: Some("you should really reconsider, your behaviour is borderline".into()),
            image_url: None,
            media_urls: vec![],
            created_at: Utc::now(),
            parent_id: None,
            channel_id: None,
            creator_metadata: None,
        },
    ]
}

fn sample_chat_messages() -> Vec<ChatMessage> {
    let base = Utc::now().timestamp() as f64;
    (0..5)
        .map(|i| ChatMessage {
            message_id: format!("chat-{i}"),
            user_id: "chatty".into(),
            channel_id: "general".into(),
            text: format!("hello from message {i}"),
            timestamp: base + i as f64,
        })
        .collect()
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moderation_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
