//! # docsynth CLI Interface (Module)
//!
//! This module implements the CLI for docsynth: command parsing, wiring of the concrete
//! remote clients into the core pipeline, and user-visible output.
//!
//! All document logic (markup parsing, the document model, `.docx` packing, tiered
//! persistence, discovery) lives in the [`docsynth_core`] crate. This module is strictly
//! CLI glue.
//!
//! ## Commands
//! - `generate`: prompt the generator and store the result, optionally through a template
//! - `store`: persist an existing markup file through the tiered orchestrator
//! - `render`: convert a markup file to a local `.docx` file, no network involved
//! - `templates` / `references`: list documents usable as templates or reference material
//! - `probe`: connectivity diagnostics for containers, search and document listing
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use crate::generator::AzureOpenAiClient;
use crate::load_config::{load_config, CliConfig, Secrets};
use crate::remote::{GraphClient, SharePointClient};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use docsynth_core::codec::{DocumentEncoder, DocxEncoder};
use docsynth_core::contract::{StoreError, TextGenerator};
use docsynth_core::discovery::StrategyState;
use docsynth_core::model::build_document;
use docsynth_core::synthesise::{Collaborators, DocumentSynthesizer, GenerationRequest};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for docsynth: turn generated markup into stored Word documents.
#[derive(Parser)]
#[clap(
    name = "docsynth",
    version,
    about = "Generate, render and store Word documents from lightly formatted text"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate content from a prompt and store it as a document
    Generate {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// What the document should contain
        #[clap(long)]
        prompt: String,
        /// Document name without extension
        #[clap(long)]
        name: String,
        /// Server-relative URL of a template to fill
        #[clap(long)]
        template: Option<String>,
        /// Server-relative URL of a reference page or document; may be repeated
        #[clap(long = "reference")]
        references: Vec<String>,
        /// Container to store into
        #[clap(long)]
        container: Option<String>,
    },
    /// Store an existing markup file as a document
    Store {
        #[clap(long)]
        config: PathBuf,
        /// Markup text file
        #[clap(long)]
        input: PathBuf,
        #[clap(long)]
        name: String,
        #[clap(long)]
        container: Option<String>,
    },
    /// Render a markup file to a local .docx file
    Render {
        #[clap(long)]
        input: PathBuf,
        #[clap(long)]
        output: PathBuf,
    },
    /// List Word documents usable as templates
    Templates {
        #[clap(long)]
        config: PathBuf,
    },
    /// List site pages and Word documents usable as reference material
    References {
        #[clap(long)]
        config: PathBuf,
    },
    /// Check container listing, search and document enumeration
    Probe {
        #[clap(long)]
        config: PathBuf,
    },
}

/// Stands in for the generator when no API key is configured; only `generate` calls it.
struct UnconfiguredGenerator;

#[async_trait::async_trait]
impl TextGenerator for UnconfiguredGenerator {
    async fn generate(&self, _: &str, _: &[String]) -> Result<String, StoreError> {
        Err("no text generator configured".into())
    }
}

fn build_synthesizer(config: &CliConfig, secrets: &Secrets) -> Result<DocumentSynthesizer> {
    let sharepoint = Arc::new(SharePointClient::new(
        &config.site_url,
        secrets.sharepoint_token.clone(),
    ));
    let graph = GraphClient::new(&config.site_url, secrets.graph_token.clone())
        .map_err(|e| anyhow!("Failed to construct Graph client: {e}"))?;
    let generator: Arc<dyn TextGenerator> = match &secrets.openai_key {
        Some(key) => Arc::new(AzureOpenAiClient::new(
            config.generation.clone(),
            key.clone(),
        )),
        None => Arc::new(UnconfiguredGenerator),
    };

    Ok(DocumentSynthesizer::new(
        &config.synthesis_config(),
        Collaborators {
            generator,
            store: sharepoint.clone(),
            api: Arc::new(graph),
            catalog: sharepoint,
            encoder: Arc::new(DocxEncoder),
        },
        Arc::new(StrategyState::new()),
    ))
}

fn connect(config: PathBuf) -> Result<DocumentSynthesizer> {
    let config = load_config(config)?;
    let secrets = Secrets::from_env()?;
    build_synthesizer(&config, &secrets)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct RenderSummary {
    output: PathBuf,
    blocks: usize,
    bytes: usize,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Generate {
            config,
            prompt,
            name,
            template,
            references,
            container,
        } => {
            let loaded = load_config(config)?;
            let secrets = Secrets::from_env()?;
            secrets.require_openai_key()?;
            let synth = build_synthesizer(&loaded, &secrets)?;
            tracing::info!(command = "generate", name = %name, "Starting document generation");

            let outcome = synth
                .generate_document(&GenerationRequest {
                    prompt,
                    document_name: name,
                    template_url: template,
                    reference_urls: references,
                    container,
                    date: chrono::Local::now().format("%Y-%m-%d").to_string(),
                })
                .await;
            print_json(&outcome)?;
            match outcome.error {
                None => Ok(()),
                Some(e) => Err(anyhow!("Document generation failed: {e}")),
            }
        }
        Commands::Store {
            config,
            input,
            name,
            container,
        } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read input file {input:?}"))?;
            let synth = connect(config)?;
            tracing::info!(command = "store", name = %name, "Storing document");
            match synth
                .synthesize_and_store(&text, &name, container.as_deref())
                .await
            {
                Ok(stored) => {
                    tracing::info!(command = "store", location = %stored.location, tier = %stored.tier, "Document stored");
                    print_json(&stored)
                }
                Err(e) => {
                    tracing::error!(command = "store", error = %e, "Storing document failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Render { input, output } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read input file {input:?}"))?;
            let document = build_document(&text);
            let bytes = DocxEncoder.encode(&document)?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write output file {output:?}"))?;
            tracing::info!(command = "render", output = ?output, blocks = document.len(), "Rendered document");
            print_json(&RenderSummary {
                output,
                blocks: document.len(),
                bytes: bytes.len(),
            })
        }
        Commands::Templates { config } => {
            let synth = connect(config)?;
            print_json(&synth.list_available_templates().await)
        }
        Commands::References { config } => {
            let synth = connect(config)?;
            print_json(&synth.list_reference_materials().await)
        }
        Commands::Probe { config } => {
            let synth = connect(config)?;
            let report = synth.discovery().test_connectivity().await;
            print_json(&report)
        }
    }
}
