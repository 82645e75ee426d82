//! CLI definition and command dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use firstaid_rag::prompt::citation_marker;
use firstaid_rag::{Answer, ChatMessage, ErrorKind, RagError, RagService, Settings};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, info};

#[derive(Parser)]
#[command(
    name = "firstaid",
    version,
    about = "Ask first-aid questions answered from your own medical documents.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Directory of PDF, text and markdown documents to index.
    #[arg(long, env = "FIRSTAID_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Vector index (collection) name.
    #[arg(long, env = "FIRSTAID_INDEX_NAME", global = true)]
    pub index_name: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Index the corpus if the vector index is empty.
    Ingest,

    /// Answer a single question.
    Ask {
        /// The question to answer.
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Print the answer and its sources as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive multi-turn conversation.
    Chat,
}

pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "firstaid_rag=warn,firstaid_cli=info",
        1 => "firstaid_rag=info,firstaid_cli=debug",
        _ => "firstaid_rag=debug,firstaid_cli=debug",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if cli.log_json {
        fmt().json().with_env_filter(env_filter).with_writer(std::io::stderr).init();
    } else {
        fmt().with_env_filter(env_filter).with_target(false).with_writer(std::io::stderr).init();
    }
}

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::from_env().map_err(user_facing)?;
    if let Some(dir) = cli.data_dir {
        settings = settings.with_data_dir(dir);
    }
    if let Some(name) = cli.index_name {
        settings = settings.with_index_name(name);
    }
    debug!(?settings, "loaded settings");

    let service = RagService::from_settings(&settings).map_err(user_facing)?;

    // Every command needs a populated index; ingestion is a no-op when it already is.
    let report = service.ingest_if_empty().await.map_err(user_facing)?;
    if report.skipped {
        info!(existing_vectors = report.existing_vectors, "using existing index");
    } else {
        info!(documents = report.documents, chunks = report.chunks, "indexed corpus");
    }

    match cli.command {
        Command::Ingest => {
            if report.skipped {
                println!(
                    "Index '{}' already holds {} vectors; nothing to do.",
                    settings.index_name, report.existing_vectors
                );
            } else {
                println!(
                    "Indexed {} chunks from {} documents into '{}'.",
                    report.chunks, report.documents, settings.index_name
                );
            }
            Ok(())
        }
        Command::Ask { question, json } => {
            let question = question.join(" ");
            let answer = service.answer(&question, &[]).await.map_err(user_facing)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
            Ok(())
        }
        Command::Chat => chat(&service).await,
    }
}

async fn chat(service: &RagService) -> Result<()> {
    let mut editor = DefaultEditor::new().context("failed to initialise line editor")?;
    let mut history: Vec<ChatMessage> = Vec::new();

    println!("First-aid assistant. Ask a question, or press Ctrl-D to quit.");
    println!("In an emergency, call your local emergency number first.\n");

    loop {
        let line = match editor.readline("you> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        editor.add_history_entry(question)?;

        match service.answer(question, &history).await {
            Ok(answer) => {
                print_answer(&answer);
                history.push(ChatMessage::user(question));
                history.push(ChatMessage::assistant(answer.text));
            }
            Err(e) if e.kind() == ErrorKind::InvalidConfig => return Err(user_facing(e)),
            Err(e) => eprintln!("{:#}\n", user_facing(e)),
        }
    }

    Ok(())
}

fn print_answer(answer: &Answer) {
    println!("\n{}\n", answer.text);
    if !answer.sources.is_empty() {
        println!("Sources:");
        for (i, hit) in answer.sources.iter().enumerate() {
            let source = hit
                .chunk
                .metadata
                .get("source")
                .map(String::as_str)
                .unwrap_or(hit.chunk.document_id.as_str());
            println!("  {} {source} (relevance {:.2})", citation_marker(i), hit.score);
        }
        println!();
    }
}

/// Attach a message per failure class, keeping the underlying error as the cause.
fn user_facing(err: RagError) -> anyhow::Error {
    let hint = match err.kind() {
        ErrorKind::InvalidConfig => "Configuration problem. Check your .env file and flags.",
        ErrorKind::InvalidInput => "Please enter a question.",
        ErrorKind::DocumentLoad => {
            "Could not read the document corpus. Check that the data directory exists and \
             contains PDF, text or markdown files."
        }
        ErrorKind::EmbeddingService => {
            "The embedding service is unavailable. Please try again in a moment."
        }
        ErrorKind::IndexUnavailable => {
            "The knowledge base (vector index) is unavailable. Please try again later."
        }
        ErrorKind::GenerationService => {
            "The language model is unavailable. Please try again in a moment."
        }
    };
    anyhow::Error::new(err).context(hint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "firstaid",
            "ask",
            "how",
            "to",
            "treat",
            "a",
            "burn",
            "--index-name",
            "kb",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.index_name.as_deref(), Some("kb"));
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Ask { question, json } => {
                assert_eq!(question.join(" "), "how to treat a burn");
                assert!(!json);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn ask_requires_a_question() {
        assert!(Cli::try_parse_from(["firstaid", "ask"]).is_err());
    }

    #[test]
    fn errors_carry_a_kind_specific_hint() {
        let err = user_facing(RagError::IndexUnavailable {
            backend: "pinecone".into(),
            message: "timeout".into(),
        });
        let rendered = format!("{err:#}");
        assert!(rendered.contains("knowledge base"));
        assert!(rendered.contains("timeout"));
    }
}
