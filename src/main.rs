// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use lessonforge_rs::adk::model::build_model;
use lessonforge_rs::forge::audio::{AudioWorkflow, NarrationMode, Narrator, OpenAiSpeech};
use lessonforge_rs::forge::config::PipelineConfig;
use lessonforge_rs::forge::server;
use lessonforge_rs::forge::workflow::Orchestrator;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pipeline configuration (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate the lesson bundle for one topic
    Run {
        /// The topic or question
        #[arg(short, long)]
        topic: String,

        /// Reference document to ground the lesson in
        #[arg(short, long)]
        document: Option<PathBuf>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
    /// Narrate a Markdown document
    Narrate {
        #[arg(short, long, default_value = "tutor")]
        mode: NarrationMode,

        /// Markdown source
        #[arg(short, long)]
        file: PathBuf,

        /// Where to write the WAV file
        #[arg(short, long, default_value = "narration.wav")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = PipelineConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Run { topic, document } => {
            let document = match document {
                Some(path) => Some(
                    tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("reading {}", path.display()))?,
                ),
                None => None,
            };

            let orchestrator = Orchestrator::from_config(config)?;
            let state = orchestrator.initial_state(&topic, document);
            let outcome = orchestrator.run(state).await?;

            println!("Task {} finished", outcome.task_id);
            println!("Output: {}", outcome.root.display());
            if let Some(pdf) = &outcome.state.pdf_path {
                println!("PDF: {}", pdf);
            }
            if let Some(md) = &outcome.state.processed_markdown_path {
                println!("Markdown: {}", md);
            }
            for (key, path) in &outcome.state.media_assets {
                println!("{}: {}", key, path);
            }
            if let Some(audio) = &outcome.state.audio_path {
                println!("Audio: {}", audio);
            }
        }
        Commands::Serve { port } => {
            let orchestrator = Arc::new(Orchestrator::from_config(config)?);
            server::serve(orchestrator, port).await?;
        }
        Commands::Narrate { mode, file, output } => {
            let document = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;

            let model = build_model(config.model.provider.as_deref(), &config.model.name)?;
            let speech = Arc::new(OpenAiSpeech::new(&config.audio)?);
            let workflow = AudioWorkflow::from_model(model, speech, &config.audio)?;

            let narration = workflow.narrate(mode, &document, &output).await?;
            println!(
                "Narrated {} lines to {}",
                narration.transcript.len(),
                narration.path.display()
            );
        }
    }

    Ok(())
}
