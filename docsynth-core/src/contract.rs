#![allow(unused)]

//! # contract: collaborator interfaces for the synthesis pipeline
//!
//! This module defines the traits through which the pipeline talks to the outside
//! world, plus the plain data types that cross those seams:
//!
//! - [`TextGenerator`]: produces the raw markup text from a prompt and reference texts.
//! - [`ObjectStore`]: path-addressed file storage (upload, copy, delete, list, read).
//! - [`DocumentApi`]: a secondary document-creation API with its own container ids.
//! - [`Catalog`]: container enumeration, per-container item queries and search.
//!
//! ## Error Handling
//! - All methods are async and return [`StoreError`], a boxed error trait object.
//! - Implementors narrow whatever the remote side returns (usually JSON) into the
//!   fixed types below before handing data to the core.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall` so tests can script failures per call.

use async_trait::async_trait;

use mockall::{automock, predicate::*};

/// Error type shared by all collaborator calls.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a successful upload: where the file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Server-relative path of the stored file.
    pub final_path: String,
}

/// One file in a folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub name: String,
    pub path: String,
    pub unique_id: Option<String>,
    pub created: Option<String>,
}

/// One list item returned by a container query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: String,
    pub title: Option<String>,
    /// File leaf name (e.g. `report.docx`).
    pub file_name: Option<String>,
    pub path: Option<String>,
    pub created: Option<String>,
}

/// A search request against the backing store's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query_text: String,
    pub row_limit: u32,
    pub trim_duplicates: bool,
}

/// A single search hit, already narrowed from the remote result shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchHit {
    pub title: Option<String>,
    pub path: Option<String>,
    pub unique_id: Option<String>,
    /// Last write timestamp as reported by the index.
    pub written: Option<String>,
}

/// Identifier of a container in the [`DocumentApi`]'s own id space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerId {
    pub site_id: String,
    pub drive_id: String,
}

/// Produces raw document text. The output is fed to the markup tokenizer unchanged.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        reference_texts: &[String],
    ) -> Result<String, StoreError>;
}

/// Path-addressed file storage.
///
/// All writes use replace semantics when `overwrite` is set, which is what makes
/// re-running a persistence attempt idempotent.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `bytes` to `path` (folder + file name).
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        overwrite: bool,
    ) -> Result<UploadedFile, StoreError>;

    /// Server-side copy of an existing file.
    async fn copy(&self, from_path: &str, to_path: &str, overwrite: bool)
        -> Result<(), StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// List the files directly inside a folder.
    async fn list_folder(&self, path: &str) -> Result<Vec<FolderEntry>, StoreError>;

    /// Read a file as text.
    async fn read_text(&self, path: &str) -> Result<String, StoreError>;
}

/// Secondary document-creation API.
///
/// Its containers are addressed by [`ContainerId`], which differs from the object store's
/// container names; [`DocumentApi::resolve_container`] performs that mapping.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn resolve_container(&self, container_name: &str) -> Result<ContainerId, StoreError>;

    async fn create_text_file(
        &self,
        container: &ContainerId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedFile, StoreError>;
}

/// Container and document enumeration.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Names of all document containers.
    async fn list_containers(&self) -> Result<Vec<String>, StoreError>;

    /// Items of one container, optionally restricted to file names containing `extension`.
    async fn list_items(
        &self,
        container: &str,
        extension: Option<String>,
    ) -> Result<Vec<CatalogItem>, StoreError>;

    async fn search(&self, query: SearchQuery) -> Result<Vec<SearchHit>, StoreError>;
}
