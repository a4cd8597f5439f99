//! High-level pipeline: generated text → document model → stored document.
//!
//! [`DocumentSynthesizer`] is the caller-facing surface of the crate. It wires the markup
//! parser, the codec, the persistence [`Orchestrator`] and [`Discovery`] together around the
//! injected collaborators.
//!
//! # Major Types
//! - [`DocumentSynthesizer`]: the entrypoint, built from a [`SynthesisConfig`] and [`Collaborators`]
//! - [`GenerationRequest`] / [`GenerationOutcome`]: the full prompt-to-document flow
//! - [`GenerationError`]: why a generation request did not produce a stored document
//!
//! # Flows
//! - [`DocumentSynthesizer::synthesize_and_store`]: parse already generated text and persist it
//!   through the tiered orchestrator.
//! - [`DocumentSynthesizer::generate_document`]: gather reference texts, prompt the generator,
//!   then store the result either directly or through a template.
//! - [`DocumentSynthesizer::create_from_template`]: fill `{{KEY}}` placeholders and persist the
//!   text through the copy-convert tier alone.
//!
//! # Logging
//! Every storage request runs inside a `synthesise` span carrying a fresh `request_id`, so the
//! tier attempts of one request can be correlated.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::codec::DocumentEncoder;
use crate::config::SynthesisConfig;
use crate::contract::{Catalog, DocumentApi, ObjectStore, StoreError, TextGenerator};
use crate::discovery::{Discovery, DocumentRef, StrategyState};
use crate::model::{build_document, Document};
use crate::persist::{
    CopyConvertTier, Orchestrator, PersistError, PersistRequest, StoredDocument, Tier,
};

/// Text used in place of a Word document's content, which cannot be read as text.
pub const WORD_REFERENCE_PLACEHOLDER: &str =
    "[Word document content: binary documents cannot be read as reference text]";

/// The external systems the pipeline talks to.
pub struct Collaborators {
    pub generator: Arc<dyn TextGenerator>,
    pub store: Arc<dyn ObjectStore>,
    pub api: Arc<dyn DocumentApi>,
    pub catalog: Arc<dyn Catalog>,
    pub encoder: Arc<dyn DocumentEncoder>,
}

#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: String,
    /// File name without extension; also used as the `TITLE` replacement.
    pub document_name: String,
    pub template_url: Option<String>,
    pub reference_urls: Vec<String>,
    pub container: Option<String>,
    /// Pre-formatted `DATE` replacement.
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationOutcome {
    pub success: bool,
    pub document_url: Option<String>,
    pub tier: Option<Tier>,
    pub error: Option<String>,
}

impl From<Result<StoredDocument, GenerationError>> for GenerationOutcome {
    fn from(result: Result<StoredDocument, GenerationError>) -> Self {
        match result {
            Ok(stored) => GenerationOutcome {
                success: true,
                document_url: Some(stored.location),
                tier: Some(stored.tier),
                error: None,
            },
            Err(e) => GenerationOutcome {
                success: false,
                document_url: None,
                tier: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("text generation failed: {0}")]
    Generator(StoreError),
    #[error("text generation returned no content")]
    EmptyResponse,
    #[error(transparent)]
    Persist(#[from] PersistError),
}

pub struct DocumentSynthesizer {
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn ObjectStore>,
    discovery: Arc<Discovery>,
    orchestrator: Orchestrator,
    template_orchestrator: Orchestrator,
    default_container: String,
}

impl DocumentSynthesizer {
    /// `state` is the session's strategy cache; share it between synthesizers of one session.
    pub fn new(config: &SynthesisConfig, parts: Collaborators, state: Arc<StrategyState>) -> Self {
        let discovery = Arc::new(Discovery::new(
            parts.catalog,
            parts.store.clone(),
            state,
            config.site_path.clone(),
        ));
        let extension = parts.encoder.extension();
        let orchestrator = Orchestrator::standard(
            discovery.clone(),
            parts.store.clone(),
            parts.api,
            parts.encoder,
        );
        let template_orchestrator = Orchestrator::new(
            discovery.clone(),
            vec![Box::new(CopyConvertTier::new(parts.store.clone(), extension))],
        );
        Self {
            generator: parts.generator,
            store: parts.store,
            discovery,
            orchestrator,
            template_orchestrator,
            default_container: config.default_container.clone(),
        }
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Parse `raw_text` and store it under `document_name`, trying each persistence tier in
    /// turn. Without a hint the configured default container is requested.
    pub async fn synthesize_and_store(
        &self,
        raw_text: &str,
        document_name: &str,
        container_hint: Option<&str>,
    ) -> Result<StoredDocument, PersistError> {
        let container = container_hint.unwrap_or(self.default_container.as_str());
        let span = info_span!(
            "synthesise",
            request_id = %Uuid::new_v4(),
            document = %document_name,
        );

        async {
            let document = build_document(raw_text);
            info!(
                blocks = document.len(),
                container = %container,
                "Parsed generated text into document model"
            );
            let request = PersistRequest {
                document_name: document_name.to_string(),
                raw_text: raw_text.to_string(),
                document,
            };
            self.orchestrator.persist(&request, container).await
        }
        .instrument(span)
        .await
    }

    /// Full flow from a user prompt to a stored document. Never fails; the outcome carries
    /// the error text instead.
    pub async fn generate_document(&self, request: &GenerationRequest) -> GenerationOutcome {
        let result = self.try_generate(request).await;
        if let Err(e) = &result {
            error!(document = %request.document_name, error = %e, "Document generation failed");
        }
        result.into()
    }

    async fn try_generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<StoredDocument, GenerationError> {
        let references = self.reference_texts(&request.reference_urls).await;
        let prompt = build_prompt(&request.prompt, &references);
        let texts: Vec<String> = references.into_iter().map(|(_, text)| text).collect();

        info!(
            references = texts.len(),
            prompt_len = prompt.len(),
            "Requesting generated content"
        );
        let content = self
            .generator
            .generate(&prompt, &texts)
            .await
            .map_err(GenerationError::Generator)?;
        if content.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        let container = request.container.as_deref();
        match &request.template_url {
            Some(template_url) => {
                let replacements = BTreeMap::from([
                    ("CONTENT".to_string(), content),
                    ("TITLE".to_string(), request.document_name.clone()),
                    ("DATE".to_string(), request.date.clone()),
                ]);
                Ok(self
                    .create_from_template(
                        template_url,
                        &replacements,
                        &request.document_name,
                        container,
                    )
                    .await?)
            }
            None => Ok(self
                .synthesize_and_store(&content, &request.document_name, container)
                .await?),
        }
    }

    /// Fill a template and store the result through the copy-convert tier.
    ///
    /// A `.docx` template cannot be read as text, so its `CONTENT` replacement is stored
    /// as-is (or, without one, every replacement rendered as a section). Other templates are
    /// read as text with tags stripped, then each `{{KEY}}` is replaced.
    pub async fn create_from_template(
        &self,
        template_url: &str,
        replacements: &BTreeMap<String, String>,
        document_name: &str,
        container_hint: Option<&str>,
    ) -> Result<StoredDocument, PersistError> {
        let container = container_hint.unwrap_or(self.default_container.as_str());
        let span = info_span!(
            "synthesise",
            request_id = %Uuid::new_v4(),
            document = %document_name,
            template = %template_url,
        );

        async {
            let content = if is_word_document(template_url) {
                replacements
                    .get("CONTENT")
                    .cloned()
                    .unwrap_or_else(|| render_sections(replacements))
            } else {
                fill_placeholders(&self.reference_text(template_url).await, replacements)
            };
            info!(length = content.len(), "Prepared template content");

            let request = PersistRequest {
                document_name: document_name.to_string(),
                // Copy-convert stores the raw text; nothing reads the model.
                document: Document::default(),
                raw_text: content,
            };
            self.template_orchestrator.persist(&request, container).await
        }
        .instrument(span)
        .await
    }

    /// Word documents usable as templates.
    pub async fn list_available_templates(&self) -> Vec<DocumentRef> {
        self.discovery.find_all_documents().await
    }

    /// Site pages followed by Word documents. Either half may be empty on failure.
    pub async fn list_reference_materials(&self) -> Vec<DocumentRef> {
        let mut materials = self.discovery.site_pages().await;
        let pages = materials.len();
        materials.extend(self.discovery.find_all_documents().await);
        info!(
            pages,
            documents = materials.len() - pages,
            "Listed reference materials"
        );
        materials
    }

    /// Plain text of one reference, with markup tags removed. Failures yield an empty string.
    pub async fn reference_text(&self, url: &str) -> String {
        if is_word_document(url) {
            return WORD_REFERENCE_PLACEHOLDER.to_string();
        }
        strip_tags(&self.read_reference(url).await)
    }

    async fn read_reference(&self, url: &str) -> String {
        match self.store.read_text(url).await {
            Ok(text) => text,
            Err(e) => {
                warn!(url, error = %e, "Could not read reference; using empty text");
                String::new()
            }
        }
    }

    /// Fetched one after another, in request order.
    async fn reference_texts(&self, urls: &[String]) -> Vec<(String, String)> {
        stream::iter(urls)
            .then(|url| async move { (url.clone(), self.reference_text(url).await) })
            .collect()
            .await
    }
}

fn is_word_document(url: &str) -> bool {
    url.to_lowercase().ends_with(".docx")
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Remove `<...>` tags and collapse whitespace runs into single spaces.
pub fn strip_tags(html: &str) -> String {
    let text = TAG_RE.replace_all(html, " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace every `{{KEY}}` occurrence with its value. Unknown placeholders are left alone.
pub fn fill_placeholders(template: &str, replacements: &BTreeMap<String, String>) -> String {
    replacements
        .iter()
        .fold(template.to_string(), |text, (key, value)| {
            text.replace(&format!("{{{{{key}}}}}"), value)
        })
}

/// One `## KEY` section per replacement, separated by rules.
fn render_sections(replacements: &BTreeMap<String, String>) -> String {
    replacements
        .iter()
        .map(|(key, value)| format!("## {key}\n\n{value}"))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Prompt sent to the generator: the user request, the reference material and the markup
/// conventions the parser understands.
pub fn build_prompt(user_prompt: &str, references: &[(String, String)]) -> String {
    let mut prompt = format!("User request: {user_prompt}\n\nREFERENCE MATERIALS:");
    if references.is_empty() {
        prompt.push_str("\nNo documents explicitly selected for reference.");
    }
    for (url, text) in references {
        prompt.push_str(&format!("\n\nContent from {url}:\n{text}"));
    }
    prompt.push_str(
        "\n\nGenerate content that matches the style and format of the existing documents. \
         The content must be professional and ready to insert into a Word document.\
         \n\nFormat the answer with this markup only: `#`, `##` or `###` headings, \
         `* ` bullet items, `**bold**` emphasis, `---` horizontal rules and \
         `| cell | cell |` table rows with a `|---|---|` separator under the header row.",
    );
    prompt
}
