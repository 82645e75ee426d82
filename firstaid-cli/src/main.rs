//! `firstaid`: a command-line first-aid chatbot.
//!
//! Answers questions from a local corpus of first-aid documents, indexed in
//! a vector database and answered by a hosted language model.

mod commands;

use clap::Parser;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
