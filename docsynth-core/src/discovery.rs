//! # discovery: containers, documents and the enumeration strategy cache
//!
//! Discovery answers two questions for the rest of the pipeline: which containers exist
//! (so persistence can pick an upload target) and which documents live in them (for the
//! template and reference-material listings).
//!
//! Two enumeration strategies exist: a site-wide search, and direct per-container
//! enumeration. Whether search works is remembered in a [`StrategyState`] shared for the
//! session; once search is known to fail, later calls go straight to direct enumeration.
//!
//! No method here returns an error. Failures degrade to a default container list or an
//! empty result and are only visible in the logs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::contract::{
    Catalog, CatalogItem, FolderEntry, ObjectStore, SearchHit, SearchQuery, StoreError,
};

/// Fallback container names when enumeration fails.
pub const DEFAULT_CONTAINERS: [&str; 3] = ["Shared Documents", "Documents", "Dokument"];
/// Container that is always offered, even when the catalog does not list it.
pub const PRIMARY_CONTAINER: &str = "Shared Documents";

const SITE_PAGES_CONTAINER: &str = "SitePages";
const WORD_EXTENSION: &str = ".docx";
const WORD_SEARCH: &str = "fileextension:docx";
const PAGE_SEARCH: &str = "contentclass:STS_ListItem_WebPageLibrary";
const SEARCH_ROW_LIMIT: u32 = 500;

/// Session-wide memo of whether search-based enumeration can be trusted.
///
/// Starts optimistic and only ever flips to unreliable. Construct a fresh state for
/// an isolated session.
#[derive(Debug)]
pub struct StrategyState {
    enumeration_is_reliable: AtomicBool,
}

impl Default for StrategyState {
    fn default() -> Self {
        Self {
            enumeration_is_reliable: AtomicBool::new(true),
        }
    }
}

impl StrategyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enumeration_reliable(&self) -> bool {
        self.enumeration_is_reliable.load(Ordering::Relaxed)
    }

    pub fn mark_enumeration_unreliable(&self) {
        if self.enumeration_is_reliable.swap(false, Ordering::Relaxed) {
            info!("Search enumeration marked unreliable for this session; using direct enumeration");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DocumentKind {
    WordDocument,
    SitePage,
}

/// A document found in the store, narrowed from whatever the catalog returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRef {
    pub id: String,
    pub name: String,
    pub url: String,
    pub kind: DocumentKind,
    pub created: Option<String>,
}

/// Where a document is to be written. Resolved per persistence attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub container_name: String,
    pub folder_path: String,
}

/// Outcome of [`Discovery::test_connectivity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectivityReport {
    pub containers: Vec<String>,
    pub search_available: bool,
    pub sample_container: Option<String>,
    pub sample_documents: usize,
}

pub struct Discovery {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn ObjectStore>,
    state: Arc<StrategyState>,
    site_path: String,
}

impl Discovery {
    /// `site_path` is the server-relative path of the site (e.g. `/sites/team`), used to
    /// build folder paths and to scope searches.
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn ObjectStore>,
        state: Arc<StrategyState>,
        site_path: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            store,
            state,
            site_path: site_path.into(),
        }
    }

    pub fn state(&self) -> &Arc<StrategyState> {
        &self.state
    }

    /// Server-relative folder path of a container.
    pub fn folder_path(&self, container: &str) -> String {
        join_path(&self.site_path, container)
    }

    /// Names of the available containers, in catalog order.
    ///
    /// Names containing `/` or `_catalogs` are dropped, [`PRIMARY_CONTAINER`] is always
    /// present, and any catalog failure yields [`DEFAULT_CONTAINERS`].
    pub async fn list_containers(&self) -> Vec<String> {
        match self.catalog.list_containers().await {
            Ok(names) => {
                let mut containers: Vec<String> = names
                    .into_iter()
                    .filter(|name| !name.contains('/') && !name.contains("_catalogs"))
                    .collect();
                if containers.is_empty() {
                    containers = default_containers();
                }
                if !containers.iter().any(|c| c == PRIMARY_CONTAINER) {
                    containers.push(PRIMARY_CONTAINER.to_string());
                }
                debug!(?containers, "Listed containers");
                containers
            }
            Err(e) => {
                error!(error = %e, "Container enumeration failed; using defaults");
                default_containers()
            }
        }
    }

    /// Pick the upload target: the requested container when it exists, otherwise the
    /// first available one.
    pub async fn resolve_target(&self, requested: &str) -> StorageTarget {
        let containers = self.list_containers().await;
        let container_name = if containers.iter().any(|c| c == requested) {
            requested.to_string()
        } else if let Some(first) = containers.first() {
            info!(
                requested,
                substitute = %first,
                "Requested container not available; using first available container"
            );
            first.clone()
        } else {
            requested.to_string()
        };
        StorageTarget {
            folder_path: self.folder_path(&container_name),
            container_name,
        }
    }

    /// Word documents in one container.
    ///
    /// Tries the catalog item query first, then a plain folder listing, then gives up
    /// with an empty list.
    pub async fn find_documents(&self, container: &str) -> Vec<DocumentRef> {
        match self
            .catalog
            .list_items(container, Some(WORD_EXTENSION.to_string()))
            .await
        {
            Ok(items) => {
                debug!(container, count = items.len(), "Listed container items");
                return items.into_iter().map(word_document_from_item).collect();
            }
            Err(e) => {
                warn!(container, error = %e, "Item query failed; trying folder listing");
            }
        }

        let folder = self.folder_path(container);
        match self.store.list_folder(&folder).await {
            Ok(entries) => {
                let docs: Vec<DocumentRef> = entries
                    .into_iter()
                    .filter(|entry| entry.name.to_lowercase().ends_with(WORD_EXTENSION))
                    .map(word_document_from_entry)
                    .collect();
                debug!(container, count = docs.len(), "Listed documents via folder path");
                docs
            }
            Err(e) => {
                error!(container, folder = %folder, error = %e, "Folder listing failed");
                Vec::new()
            }
        }
    }

    /// Word documents across the whole site.
    ///
    /// Uses search while it is considered reliable; an empty search result falls through
    /// to direct enumeration, a failing search additionally marks search unreliable.
    pub async fn find_all_documents(&self) -> Vec<DocumentRef> {
        if !self.state.is_enumeration_reliable() {
            debug!("Search known unreliable; enumerating containers directly");
            return self.documents_from_containers().await;
        }

        match self.search_documents(WORD_SEARCH, DocumentKind::WordDocument).await {
            Ok(docs) if !docs.is_empty() => {
                info!(count = docs.len(), "Search found documents");
                return docs;
            }
            Ok(_) => info!("Search returned no documents; enumerating containers directly"),
            Err(e) => {
                warn!(error = %e, "Search failed; enumerating containers directly");
                self.state.mark_enumeration_unreliable();
            }
        }
        self.documents_from_containers().await
    }

    /// Pages of the site pages container.
    pub async fn site_pages(&self) -> Vec<DocumentRef> {
        if self.state.is_enumeration_reliable() {
            match self.search_documents(PAGE_SEARCH, DocumentKind::SitePage).await {
                Ok(pages) if !pages.is_empty() => return pages,
                Ok(_) => debug!("Page search returned nothing"),
                Err(e) => warn!(error = %e, "Page search failed"),
            }
        }

        match self.catalog.list_items(SITE_PAGES_CONTAINER, None).await {
            Ok(items) => items.into_iter().map(site_page_from_item).collect(),
            Err(e) => {
                error!(error = %e, "Listing site pages failed");
                Vec::new()
            }
        }
    }

    /// Run one test search. A thrown error marks search unreliable for the rest of the
    /// session; an empty result does not. Returns the resulting reliability.
    pub async fn probe_enumeration_reliability(&self) -> bool {
        let query = SearchQuery {
            query_text: WORD_SEARCH.to_string(),
            row_limit: 1,
            trim_duplicates: false,
        };
        match self.catalog.search(query).await {
            Ok(hits) => {
                info!(found = !hits.is_empty(), "Search probe succeeded");
            }
            Err(e) => {
                error!(error = %e, "Search probe failed");
                self.state.mark_enumeration_unreliable();
            }
        }
        self.state.is_enumeration_reliable()
    }

    /// Diagnostic pass over containers, search and the first container's documents.
    pub async fn test_connectivity(&self) -> ConnectivityReport {
        info!("Starting connectivity test");
        let containers = self.list_containers().await;
        let search_available = self.probe_enumeration_reliability().await;

        let sample_container = containers.first().cloned();
        let sample_documents = match &sample_container {
            Some(container) => self.find_documents(container).await.len(),
            None => 0,
        };

        let report = ConnectivityReport {
            containers,
            search_available,
            sample_container,
            sample_documents,
        };
        info!(
            containers = report.containers.len(),
            search_available = report.search_available,
            sample_documents = report.sample_documents,
            "Connectivity test finished"
        );
        report
    }

    async fn search_documents(
        &self,
        query_text: &str,
        kind: DocumentKind,
    ) -> Result<Vec<DocumentRef>, StoreError> {
        let query = SearchQuery {
            query_text: self.scoped_query(query_text),
            row_limit: SEARCH_ROW_LIMIT,
            trim_duplicates: true,
        };
        let hits = self.catalog.search(query).await?;
        Ok(hits
            .into_iter()
            .map(|hit| document_from_hit(hit, kind))
            .collect())
    }

    async fn documents_from_containers(&self) -> Vec<DocumentRef> {
        let mut documents = Vec::new();
        for container in self.list_containers().await {
            let docs = self.find_documents(&container).await;
            if !docs.is_empty() {
                debug!(container = %container, count = docs.len(), "Found documents");
            }
            documents.extend(docs);
        }
        documents
    }

    fn scoped_query(&self, query_text: &str) -> String {
        if self.site_path.is_empty() || self.site_path == "/" {
            query_text.to_string()
        } else {
            format!("{query_text} path:{}", self.site_path)
        }
    }
}

fn default_containers() -> Vec<String> {
    DEFAULT_CONTAINERS.iter().map(|c| c.to_string()).collect()
}

/// Join two path segments with exactly one `/` between them.
pub fn join_path(base: &str, segment: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{segment}")
    } else {
        format!("{base}/{segment}")
    }
}

fn document_from_hit(hit: SearchHit, kind: DocumentKind) -> DocumentRef {
    let file_name = hit
        .path
        .as_deref()
        .and_then(|p| p.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    DocumentRef {
        id: hit.unique_id.unwrap_or_else(|| "unknown".to_string()),
        name: file_name
            .or(hit.title)
            .unwrap_or_else(|| "Unnamed Document".to_string()),
        url: hit.path.unwrap_or_default(),
        kind,
        created: hit.written,
    }
}

fn word_document_from_item(item: CatalogItem) -> DocumentRef {
    DocumentRef {
        id: item.id,
        name: item
            .file_name
            .unwrap_or_else(|| "Unnamed Document".to_string()),
        url: item.path.unwrap_or_default(),
        kind: DocumentKind::WordDocument,
        created: item.created,
    }
}

fn site_page_from_item(item: CatalogItem) -> DocumentRef {
    DocumentRef {
        id: item.id,
        name: item
            .title
            .or(item.file_name)
            .unwrap_or_else(|| "Unnamed Page".to_string()),
        url: item.path.unwrap_or_default(),
        kind: DocumentKind::SitePage,
        created: item.created,
    }
}

fn word_document_from_entry(entry: FolderEntry) -> DocumentRef {
    DocumentRef {
        id: entry.unique_id.unwrap_or_else(|| "unknown".to_string()),
        name: entry.name,
        url: entry.path,
        kind: DocumentKind::WordDocument,
        created: entry.created,
    }
}
