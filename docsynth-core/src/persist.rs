//! # persist: tiered persistence of generated documents
//!
//! A document is stored by trying an ordered list of [`PersistStrategy`] tiers:
//!
//! 1. [`BinaryUploadTier`]: encode the model as `.docx` and upload it with overwrite.
//! 2. [`RemoteApiTier`]: hand the raw text to the document-creation API as a `.txt` file.
//! 3. [`CopyConvertTier`]: upload the raw text as a temporary file, copy it to the final
//!    `.docx` name and remove the temporary file.
//!
//! The first tier that succeeds wins. Before every attempt the upload container is
//! resolved again through [`Discovery`]. When every tier fails the caller receives
//! [`PersistError::Exhausted`] carrying the *first* tier's error; later errors are logged
//! and kept as secondary failures.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::codec::{CodecError, DocumentEncoder};
use crate::contract::{DocumentApi, ObjectStore, StoreError};
use crate::discovery::{join_path, Discovery, StorageTarget};
use crate::model::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    BinaryUpload,
    RemoteApi,
    CopyConvert,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::BinaryUpload => "binary-upload",
            Tier::RemoteApi => "remote-api",
            Tier::CopyConvert => "copy-convert",
        };
        f.write_str(name)
    }
}

/// Everything a tier may need to store one document.
#[derive(Debug, Clone)]
pub struct PersistRequest {
    /// File name without extension.
    pub document_name: String,
    /// Unformatted generated text, used by the text-based tiers.
    pub raw_text: String,
    pub document: Document,
}

/// Where a document ended up and which tier put it there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredDocument {
    pub location: String,
    pub tier: Tier,
}

impl StoredDocument {
    /// Stored by a lower-fidelity tier than the binary upload.
    pub fn is_degraded(&self) -> bool {
        self.tier != Tier::BinaryUpload
    }
}

#[derive(Debug, Error)]
pub enum TierError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("transport failure: {0}")]
    Transport(StoreError),
}

#[derive(Debug)]
pub struct TierFailure {
    pub tier: Tier,
    pub error: TierError,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("all persistence tiers failed; {primary_tier} tier: {primary}")]
    Exhausted {
        primary_tier: Tier,
        #[source]
        primary: TierError,
        secondary: Vec<TierFailure>,
    },
    #[error("no persistence tiers configured")]
    NoTiers,
}

/// One way of storing a document. Returns the stored location.
#[async_trait]
pub trait PersistStrategy: Send + Sync {
    fn tier(&self) -> Tier;

    async fn attempt(
        &self,
        request: &PersistRequest,
        target: &StorageTarget,
    ) -> Result<String, TierError>;
}

pub struct BinaryUploadTier {
    store: Arc<dyn ObjectStore>,
    encoder: Arc<dyn DocumentEncoder>,
}

impl BinaryUploadTier {
    pub fn new(store: Arc<dyn ObjectStore>, encoder: Arc<dyn DocumentEncoder>) -> Self {
        Self { store, encoder }
    }
}

#[async_trait]
impl PersistStrategy for BinaryUploadTier {
    fn tier(&self) -> Tier {
        Tier::BinaryUpload
    }

    async fn attempt(
        &self,
        request: &PersistRequest,
        target: &StorageTarget,
    ) -> Result<String, TierError> {
        let bytes = self.encoder.encode(&request.document)?;
        let path = join_path(
            &target.folder_path,
            &format!("{}.{}", request.document_name, self.encoder.extension()),
        );
        info!(path = %path, size = bytes.len(), "Uploading encoded document");
        let uploaded = self
            .store
            .upload(&path, bytes, true)
            .await
            .map_err(TierError::Transport)?;
        Ok(uploaded.final_path)
    }
}

pub struct RemoteApiTier {
    api: Arc<dyn DocumentApi>,
}

impl RemoteApiTier {
    pub fn new(api: Arc<dyn DocumentApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PersistStrategy for RemoteApiTier {
    fn tier(&self) -> Tier {
        Tier::RemoteApi
    }

    async fn attempt(
        &self,
        request: &PersistRequest,
        target: &StorageTarget,
    ) -> Result<String, TierError> {
        let container = self
            .api
            .resolve_container(&target.container_name)
            .await
            .map_err(TierError::Transport)?;
        let file_name = format!("{}.txt", request.document_name);
        info!(
            file_name = %file_name,
            drive_id = %container.drive_id,
            "Creating text document through document API"
        );
        let created = self
            .api
            .create_text_file(&container, &file_name, request.raw_text.as_bytes().to_vec())
            .await
            .map_err(TierError::Transport)?;
        Ok(created.final_path)
    }
}

pub struct CopyConvertTier {
    store: Arc<dyn ObjectStore>,
    extension: &'static str,
}

impl CopyConvertTier {
    /// `extension` is the final file extension the copy is given, without the dot.
    pub fn new(store: Arc<dyn ObjectStore>, extension: &'static str) -> Self {
        Self { store, extension }
    }
}

#[async_trait]
impl PersistStrategy for CopyConvertTier {
    fn tier(&self) -> Tier {
        Tier::CopyConvert
    }

    /// Only the temporary upload can fail this tier. A failed copy returns the temporary
    /// file's location; a failed cleanup is logged and ignored.
    async fn attempt(
        &self,
        request: &PersistRequest,
        target: &StorageTarget,
    ) -> Result<String, TierError> {
        let temp_path = join_path(
            &target.folder_path,
            &format!("{}_temp.txt", request.document_name),
        );
        info!(path = %temp_path, "Uploading temporary text file");
        let temp = self
            .store
            .upload(&temp_path, request.raw_text.as_bytes().to_vec(), true)
            .await
            .map_err(TierError::Transport)?;

        let final_path = join_path(
            &target.folder_path,
            &format!("{}.{}", request.document_name, self.extension),
        );
        if let Err(e) = self.store.copy(&temp.final_path, &final_path, true).await {
            error!(
                from = %temp.final_path,
                to = %final_path,
                error = %e,
                "Copy to final name failed; keeping temporary file"
            );
            return Ok(temp.final_path);
        }

        if let Err(e) = self.store.delete(&temp.final_path).await {
            warn!(path = %temp.final_path, error = %e, "Could not delete temporary file");
        }
        Ok(final_path)
    }
}

/// Runs persistence tiers in order until one succeeds.
pub struct Orchestrator {
    discovery: Arc<Discovery>,
    tiers: Vec<Box<dyn PersistStrategy>>,
}

impl Orchestrator {
    pub fn new(discovery: Arc<Discovery>, tiers: Vec<Box<dyn PersistStrategy>>) -> Self {
        Self { discovery, tiers }
    }

    /// Binary upload, then document API, then copy-convert.
    pub fn standard(
        discovery: Arc<Discovery>,
        store: Arc<dyn ObjectStore>,
        api: Arc<dyn DocumentApi>,
        encoder: Arc<dyn DocumentEncoder>,
    ) -> Self {
        let extension = encoder.extension();
        Self::new(
            discovery,
            vec![
                Box::new(BinaryUploadTier::new(store.clone(), encoder)),
                Box::new(RemoteApiTier::new(api)),
                Box::new(CopyConvertTier::new(store, extension)),
            ],
        )
    }

    pub fn tiers(&self) -> Vec<Tier> {
        self.tiers.iter().map(|t| t.tier()).collect()
    }

    pub async fn persist(
        &self,
        request: &PersistRequest,
        container: &str,
    ) -> Result<StoredDocument, PersistError> {
        let mut failures: Vec<TierFailure> = Vec::new();

        for strategy in &self.tiers {
            let tier = strategy.tier();
            let target = self.discovery.resolve_target(container).await;
            info!(
                %tier,
                container = %target.container_name,
                document = %request.document_name,
                "Attempting persistence tier"
            );

            match strategy.attempt(request, &target).await {
                Ok(location) => {
                    info!(%tier, location = %location, "Document stored");
                    return Ok(StoredDocument { location, tier });
                }
                Err(error) => {
                    error!(%tier, error = %error, "Persistence tier failed");
                    failures.push(TierFailure { tier, error });
                }
            }
        }

        let mut failures = failures.into_iter();
        match failures.next() {
            Some(first) => {
                error!(
                    primary_tier = %first.tier,
                    error = %first.error,
                    "All persistence tiers failed"
                );
                Err(PersistError::Exhausted {
                    primary_tier: first.tier,
                    primary: first.error,
                    secondary: failures.collect(),
                })
            }
            None => Err(PersistError::NoTiers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DocxEncoder, MockDocumentEncoder};
    use crate::contract::{ContainerId, MockCatalog, MockDocumentApi, MockObjectStore, UploadedFile};
    use crate::discovery::StrategyState;
    use crate::model::build_document;

    const FOLDER: &str = "/sites/team/Shared Documents";

    fn catalog() -> MockCatalog {
        let mut catalog = MockCatalog::new();
        catalog
            .expect_list_containers()
            .returning(|| Ok(vec!["Shared Documents".to_string()]));
        catalog
    }

    fn request() -> PersistRequest {
        let raw = "# Report\n\nBody **text**";
        PersistRequest {
            document_name: "Report".to_string(),
            raw_text: raw.to_string(),
            document: build_document(raw),
        }
    }

    fn orchestrator(
        store: MockObjectStore,
        api: MockDocumentApi,
        encoder: Arc<dyn DocumentEncoder>,
    ) -> Orchestrator {
        let store: Arc<dyn ObjectStore> = Arc::new(store);
        let discovery = Arc::new(Discovery::new(
            Arc::new(catalog()),
            store.clone(),
            Arc::new(StrategyState::new()),
            "/sites/team",
        ));
        Orchestrator::standard(discovery, store, Arc::new(api), encoder)
    }

    fn failing_encoder() -> Arc<dyn DocumentEncoder> {
        let mut encoder = MockDocumentEncoder::new();
        encoder.expect_extension().return_const("docx");
        encoder
            .expect_encode()
            .returning(|_| Err(CodecError::Pack("zip writer exploded".to_string())));
        Arc::new(encoder)
    }

    fn failing_api() -> MockDocumentApi {
        let mut api = MockDocumentApi::new();
        api.expect_resolve_container()
            .returning(|_| Err("graph unavailable".into()));
        api
    }

    #[test]
    fn standard_tier_order() {
        let o = orchestrator(
            MockObjectStore::new(),
            MockDocumentApi::new(),
            Arc::new(DocxEncoder),
        );
        assert_eq!(
            o.tiers(),
            vec![Tier::BinaryUpload, Tier::RemoteApi, Tier::CopyConvert]
        );
    }

    #[tokio::test]
    async fn binary_upload_succeeds_first() {
        let mut store = MockObjectStore::new();
        store
            .expect_upload()
            .withf(|path, bytes, overwrite| {
                path == "/sites/team/Shared Documents/Report.docx"
                    && bytes.starts_with(b"PK")
                    && *overwrite
            })
            .times(1)
            .returning(|path, _, _| {
                Ok(UploadedFile {
                    final_path: path.to_string(),
                })
            });
        let o = orchestrator(store, MockDocumentApi::new(), Arc::new(DocxEncoder));

        let stored = o.persist(&request(), "Shared Documents").await.unwrap();
        assert_eq!(stored.location, format!("{FOLDER}/Report.docx"));
        assert_eq!(stored.tier, Tier::BinaryUpload);
        assert!(!stored.is_degraded());
    }

    #[tokio::test]
    async fn codec_failure_falls_back_to_remote_api() {
        let mut api = MockDocumentApi::new();
        api.expect_resolve_container()
            .withf(|name| name == "Shared Documents")
            .returning(|_| {
                Ok(ContainerId {
                    site_id: "site".to_string(),
                    drive_id: "drive".to_string(),
                })
            });
        api.expect_create_text_file()
            .withf(|_, file_name, bytes| file_name == "Report.txt" && bytes.starts_with(b"# Report"))
            .returning(|_, file_name, _| {
                Ok(UploadedFile {
                    final_path: format!("{FOLDER}/{file_name}"),
                })
            });
        let o = orchestrator(MockObjectStore::new(), api, failing_encoder());

        let stored = o.persist(&request(), "Shared Documents").await.unwrap();
        assert_eq!(stored.tier, Tier::RemoteApi);
        assert_eq!(stored.location, format!("{FOLDER}/Report.txt"));
        assert!(stored.is_degraded());
    }

    #[tokio::test]
    async fn third_tier_result_is_returned_when_first_two_fail() {
        let mut store = MockObjectStore::new();
        store
            .expect_upload()
            .withf(|path, _, overwrite| path.ends_with("Report_temp.txt") && *overwrite)
            .returning(|path, _, _| {
                Ok(UploadedFile {
                    final_path: path.to_string(),
                })
            });
        store
            .expect_copy()
            .withf(|from, to, overwrite| {
                from == "/sites/team/Shared Documents/Report_temp.txt"
                    && to == "/sites/team/Shared Documents/Report.docx"
                    && *overwrite
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        store
            .expect_delete()
            .withf(|path| path.ends_with("Report_temp.txt"))
            .times(1)
            .returning(|_| Ok(()));
        let o = orchestrator(store, failing_api(), failing_encoder());

        let stored = o.persist(&request(), "Shared Documents").await.unwrap();
        assert_eq!(stored.tier, Tier::CopyConvert);
        assert_eq!(stored.location, format!("{FOLDER}/Report.docx"));
    }

    #[tokio::test]
    async fn failed_copy_returns_temporary_file() {
        let mut store = MockObjectStore::new();
        store.expect_upload().returning(|path, _, _| {
            Ok(UploadedFile {
                final_path: path.to_string(),
            })
        });
        store
            .expect_copy()
            .returning(|_, _, _| Err("copy not permitted".into()));
        store.expect_delete().never();
        let o = orchestrator(store, failing_api(), failing_encoder());

        let stored = o.persist(&request(), "Shared Documents").await.unwrap();
        assert_eq!(stored.location, format!("{FOLDER}/Report_temp.txt"));
    }

    #[tokio::test]
    async fn failed_cleanup_does_not_fail_the_tier() {
        let mut store = MockObjectStore::new();
        store.expect_upload().returning(|path, _, _| {
            Ok(UploadedFile {
                final_path: path.to_string(),
            })
        });
        store.expect_copy().returning(|_, _, _| Ok(()));
        store
            .expect_delete()
            .returning(|_| Err("locked".into()));
        let o = orchestrator(store, failing_api(), failing_encoder());

        let stored = o.persist(&request(), "Shared Documents").await.unwrap();
        assert_eq!(stored.location, format!("{FOLDER}/Report.docx"));
    }

    #[tokio::test]
    async fn exhaustion_surfaces_the_first_tier_error() {
        let mut store = MockObjectStore::new();
        store.expect_upload().returning(|path, _, _| {
            if path.ends_with("_temp.txt") {
                Err("temp upload refused".into())
            } else {
                Err("binary upload refused".into())
            }
        });
        let o = orchestrator(store, failing_api(), Arc::new(DocxEncoder));

        let err = o.persist(&request(), "Shared Documents").await.unwrap_err();
        match err {
            PersistError::Exhausted {
                primary_tier,
                primary,
                secondary,
            } => {
                assert_eq!(primary_tier, Tier::BinaryUpload);
                assert!(primary.to_string().contains("binary upload refused"));
                assert_eq!(secondary.len(), 2);
                assert_eq!(secondary[0].tier, Tier::RemoteApi);
                assert_eq!(secondary[1].tier, Tier::CopyConvert);
                assert!(secondary[1].error.to_string().contains("temp upload refused"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_tier_list_reports_no_tiers() {
        let store: Arc<dyn ObjectStore> = Arc::new(MockObjectStore::new());
        let discovery = Arc::new(Discovery::new(
            Arc::new(catalog()),
            store,
            Arc::new(StrategyState::new()),
            "/sites/team",
        ));
        let o = Orchestrator::new(discovery, Vec::new());
        assert!(matches!(
            o.persist(&request(), "Shared Documents").await,
            Err(PersistError::NoTiers)
        ));
    }
}
