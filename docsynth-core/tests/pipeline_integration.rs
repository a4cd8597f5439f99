use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docsynth_core::codec::{DocxEncoder, MockDocumentEncoder};
use docsynth_core::config::SynthesisConfig;
use docsynth_core::contract::{
    FolderEntry, MockCatalog, MockDocumentApi, MockTextGenerator, ObjectStore, StoreError,
    UploadedFile,
};
use docsynth_core::discovery::StrategyState;
use docsynth_core::persist::{PersistError, Tier};
use docsynth_core::synthesise::{Collaborators, DocumentSynthesizer, GenerationRequest};

const FOLDER: &str = "/sites/team/Shared Documents";

/// Path-addressed store kept in memory. Copying a missing file fails like a remote would.
#[derive(Default)]
struct InMemoryStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    fn with_file(path: &str, content: &str) -> Self {
        let store = Self::default();
        store
            .files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.as_bytes().to_vec());
        store
    }

    fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        overwrite: bool,
    ) -> Result<UploadedFile, StoreError> {
        let mut files = self.files.lock().unwrap();
        if !overwrite && files.contains_key(path) {
            return Err(format!("{path} already exists").into());
        }
        files.insert(path.to_string(), bytes);
        Ok(UploadedFile {
            final_path: path.to_string(),
        })
    }

    async fn copy(&self, from_path: &str, to_path: &str, _overwrite: bool) -> Result<(), StoreError> {
        let mut files = self.files.lock().unwrap();
        let bytes = files
            .get(from_path)
            .cloned()
            .ok_or_else(|| format!("{from_path} not found"))?;
        files.insert(to_path.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    async fn list_folder(&self, path: &str) -> Result<Vec<FolderEntry>, StoreError> {
        let prefix = format!("{path}/");
        Ok(self
            .paths()
            .into_iter()
            .filter_map(|p| {
                let name = p.strip_prefix(&prefix)?.to_string();
                Some(FolderEntry {
                    name,
                    path: p.clone(),
                    unique_id: None,
                    created: None,
                })
            })
            .collect())
    }

    async fn read_text(&self, path: &str) -> Result<String, StoreError> {
        let bytes = self.get(path).ok_or_else(|| format!("{path} not found"))?;
        Ok(String::from_utf8(bytes)?)
    }
}

fn catalog() -> MockCatalog {
    let mut catalog = MockCatalog::new();
    catalog
        .expect_list_containers()
        .returning(|| Ok(vec!["Shared Documents".to_string(), "Reports".to_string()]));
    catalog
}

fn synthesizer(
    store: Arc<InMemoryStore>,
    generator: MockTextGenerator,
    catalog: MockCatalog,
) -> DocumentSynthesizer {
    DocumentSynthesizer::new(
        &SynthesisConfig::new("/sites/team"),
        Collaborators {
            generator: Arc::new(generator),
            store,
            api: Arc::new(MockDocumentApi::new()),
            catalog: Arc::new(catalog),
            encoder: Arc::new(DocxEncoder),
        },
        Arc::new(StrategyState::new()),
    )
}

#[tokio::test]
async fn stores_docx_and_converges_on_rerun() {
    let store = Arc::new(InMemoryStore::default());
    let synth = synthesizer(store.clone(), MockTextGenerator::new(), catalog());

    let first = synth
        .synthesize_and_store("# Title\n\nSome **bold** text", "Report", None)
        .await
        .expect("first store should succeed");
    let second = synth
        .synthesize_and_store("# Title v2\n\n| A | B |\n|---|---|\n| 1 | 2 |", "Report", None)
        .await
        .expect("second store should succeed");

    assert_eq!(first.tier, Tier::BinaryUpload);
    assert_eq!(first.location, format!("{FOLDER}/Report.docx"));
    assert_eq!(first, second);
    assert_eq!(store.paths(), vec![format!("{FOLDER}/Report.docx")]);

    let bytes = store.get(&first.location).unwrap();
    assert!(bytes.starts_with(b"PK\x03\x04"));
}

#[tokio::test]
async fn unknown_container_hint_uses_first_available() {
    let store = Arc::new(InMemoryStore::default());
    let synth = synthesizer(store.clone(), MockTextGenerator::new(), catalog());

    let stored = synth
        .synthesize_and_store("text", "Notes", Some("Archive"))
        .await
        .unwrap();
    assert_eq!(stored.location, format!("{FOLDER}/Notes.docx"));
}

#[tokio::test]
async fn encoder_failure_ends_in_copy_convert_when_api_is_down() {
    let store = Arc::new(InMemoryStore::default());
    let mut encoder = MockDocumentEncoder::new();
    encoder.expect_extension().return_const("docx");
    encoder
        .expect_encode()
        .returning(|_| Err(docsynth_core::codec::CodecError::Pack("broken".into())));
    let mut api = MockDocumentApi::new();
    api.expect_resolve_container()
        .returning(|_| Err("no drive".into()));

    let synth = DocumentSynthesizer::new(
        &SynthesisConfig::new("/sites/team"),
        Collaborators {
            generator: Arc::new(MockTextGenerator::new()),
            store: store.clone(),
            api: Arc::new(api),
            catalog: Arc::new(catalog()),
            encoder: Arc::new(encoder),
        },
        Arc::new(StrategyState::new()),
    );

    let stored = synth
        .synthesize_and_store("# Raw", "Fallback", None)
        .await
        .unwrap();
    assert_eq!(stored.tier, Tier::CopyConvert);
    assert_eq!(stored.location, format!("{FOLDER}/Fallback.docx"));
    // Temporary upload removed, final copy holds the raw text.
    assert_eq!(store.paths(), vec![format!("{FOLDER}/Fallback.docx")]);
    assert_eq!(store.get(&stored.location).unwrap(), b"# Raw".to_vec());
}

#[tokio::test]
async fn generation_uses_stripped_reference_text() {
    let store = Arc::new(InMemoryStore::with_file(
        "/sites/team/SitePages/Guide.aspx",
        "<html><body><h1>Style   guide</h1><p>Use tables.</p></body></html>",
    ));
    let mut generator = MockTextGenerator::new();
    generator
        .expect_generate()
        .withf(|prompt, refs| {
            prompt.contains("User request: Write the Q3 report")
                && prompt.contains("Content from /sites/team/SitePages/Guide.aspx:\nStyle guide Use tables.")
                && refs.len() == 2
                && refs[1].contains("Word document")
        })
        .times(1)
        .returning(|_, _| Ok("# Q3\n\n* growth".to_string()));
    let synth = synthesizer(store.clone(), generator, catalog());

    let outcome = synth
        .generate_document(&GenerationRequest {
            prompt: "Write the Q3 report".to_string(),
            document_name: "Q3".to_string(),
            reference_urls: vec![
                "/sites/team/SitePages/Guide.aspx".to_string(),
                "/sites/team/Shared Documents/Old.docx".to_string(),
            ],
            ..Default::default()
        })
        .await;

    assert!(outcome.success, "unexpected outcome: {outcome:?}");
    assert_eq!(outcome.document_url, Some(format!("{FOLDER}/Q3.docx")));
    assert_eq!(outcome.tier, Some(Tier::BinaryUpload));
}

#[tokio::test]
async fn generator_failure_is_reported_in_outcome() {
    let mut generator = MockTextGenerator::new();
    generator
        .expect_generate()
        .returning(|_, _| Err("429 too many requests".into()));
    let store = Arc::new(InMemoryStore::default());
    let synth = synthesizer(store.clone(), generator, catalog());

    let outcome = synth
        .generate_document(&GenerationRequest {
            prompt: "anything".to_string(),
            document_name: "Doc".to_string(),
            ..Default::default()
        })
        .await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("429"));
    assert!(store.paths().is_empty());
}

#[tokio::test]
async fn text_template_is_stripped_filled_and_copy_converted() {
    let template_path = "/sites/team/Shared Documents/template.txt";
    let store = Arc::new(InMemoryStore::with_file(
        template_path,
        "<p># {{TITLE}}</p>\n  <p>{{DATE}}</p>",
    ));
    let synth = synthesizer(store.clone(), MockTextGenerator::new(), catalog());

    let replacements = BTreeMap::from([
        ("TITLE".to_string(), "Minutes".to_string()),
        ("DATE".to_string(), "2024-05-01".to_string()),
        ("CONTENT".to_string(), "unused".to_string()),
    ]);
    let stored = synth
        .create_from_template(template_path, &replacements, "Minutes", None)
        .await
        .unwrap();

    assert_eq!(stored.tier, Tier::CopyConvert);
    assert_eq!(stored.location, format!("{FOLDER}/Minutes.docx"));
    assert_eq!(
        String::from_utf8(store.get(&stored.location).unwrap()).unwrap(),
        "# Minutes 2024-05-01"
    );
    assert!(store.get(&format!("{FOLDER}/Minutes_temp.txt")).is_none());
}

#[tokio::test]
async fn docx_template_stores_content_replacement() {
    let store = Arc::new(InMemoryStore::default());
    let synth = synthesizer(store.clone(), MockTextGenerator::new(), catalog());

    let replacements = BTreeMap::from([("CONTENT".to_string(), "# Body".to_string())]);
    let stored = synth
        .create_from_template(
            "/sites/team/Shared Documents/Template.DOCX",
            &replacements,
            "FromTemplate",
            Some("Reports"),
        )
        .await
        .unwrap();

    assert_eq!(stored.location, "/sites/team/Reports/FromTemplate.docx");
    assert_eq!(store.get(&stored.location).unwrap(), b"# Body".to_vec());
}

#[tokio::test]
async fn exhausted_tiers_surface_binary_upload_error() {
    struct RefusingStore;

    #[async_trait]
    impl ObjectStore for RefusingStore {
        async fn upload(&self, path: &str, _: Vec<u8>, _: bool) -> Result<UploadedFile, StoreError> {
            Err(format!("403 forbidden: {path}").into())
        }
        async fn copy(&self, _: &str, _: &str, _: bool) -> Result<(), StoreError> {
            Err("403 forbidden".into())
        }
        async fn delete(&self, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn list_folder(&self, _: &str) -> Result<Vec<FolderEntry>, StoreError> {
            Ok(vec![])
        }
        async fn read_text(&self, _: &str) -> Result<String, StoreError> {
            Err("403 forbidden".into())
        }
    }

    let mut api = MockDocumentApi::new();
    api.expect_resolve_container()
        .returning(|_| Err("graph down".into()));
    let synth = DocumentSynthesizer::new(
        &SynthesisConfig::new("/sites/team"),
        Collaborators {
            generator: Arc::new(MockTextGenerator::new()),
            store: Arc::new(RefusingStore),
            api: Arc::new(api),
            catalog: Arc::new(catalog()),
            encoder: Arc::new(DocxEncoder),
        },
        Arc::new(StrategyState::new()),
    );

    let err = synth
        .synthesize_and_store("text", "Blocked", None)
        .await
        .unwrap_err();
    match err {
        PersistError::Exhausted { primary_tier, primary, .. } => {
            assert_eq!(primary_tier, Tier::BinaryUpload);
            assert!(primary.to_string().contains("Blocked.docx"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn shared_state_skips_search_across_synthesizers() {
    let state = Arc::new(StrategyState::new());
    let store = Arc::new(InMemoryStore::with_file(&format!("{FOLDER}/a.docx"), "x"));

    let build = |catalog: MockCatalog| {
        DocumentSynthesizer::new(
            &SynthesisConfig::new("/sites/team"),
            Collaborators {
                generator: Arc::new(MockTextGenerator::new()),
                store: store.clone(),
                api: Arc::new(MockDocumentApi::new()),
                catalog: Arc::new(catalog),
                encoder: Arc::new(DocxEncoder),
            },
            state.clone(),
        )
    };

    let mut failing = catalog();
    failing
        .expect_search()
        .times(1)
        .returning(|_| Err("search disabled".into()));
    failing
        .expect_list_items()
        .returning(|_, _| Err("item query disabled".into()));
    let first = build(failing);
    assert_eq!(first.list_available_templates().await.len(), 1);
    assert!(!state.is_enumeration_reliable());

    let mut second_catalog = catalog();
    second_catalog.expect_search().never();
    second_catalog
        .expect_list_items()
        .returning(|_, _| Err("item query disabled".into()));
    let second = build(second_catalog);
    let templates = second.list_available_templates().await;
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].name, "a.docx");
}

#[tokio::test]
async fn reference_materials_tolerate_page_failure() {
    let mut catalog = catalog();
    catalog
        .expect_search()
        .returning(|_| Err("search disabled".into()));
    catalog
        .expect_list_items()
        .returning(|_, _| Err("item query disabled".into()));
    let store = Arc::new(InMemoryStore::with_file(&format!("{FOLDER}/b.docx"), "x"));
    let synth = synthesizer(store, MockTextGenerator::new(), catalog);

    let materials = synth.list_reference_materials().await;
    assert_eq!(materials.len(), 1);
    assert_eq!(materials[0].url, format!("{FOLDER}/b.docx"));
}
