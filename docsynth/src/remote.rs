#![doc = "Remote storage clients: SharePoint REST and Microsoft Graph implementations of the core storage traits."]
//
//! # Storage Integration (CLI <-> Core)
//!
//! This module wires the storage contracts from [`docsynth_core::contract`] to real services:
//!
//! - [`SharePointClient`] implements [`ObjectStore`] and [`Catalog`] against the site's REST API.
//! - [`GraphClient`] implements [`DocumentApi`] against Microsoft Graph drives.
//!
//! Both speak JSON over `reqwest` with a bearer token. Responses are parsed into
//! [`serde_json::Value`] and narrowed into the core's fixed types by the `narrow_*` helpers;
//! fields that are missing or of the wrong shape become `None` or drop the entry.

use async_trait::async_trait;
use docsynth_core::contract::{
    Catalog, CatalogItem, ContainerId, DocumentApi, FolderEntry, ObjectStore, SearchHit,
    SearchQuery, StoreError, UploadedFile,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde_json::Value;
use sha2::{Digest, Sha256};

const ODATA_JSON: &str = "application/json;odata=nometadata";
const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

fn auth_headers(token: &str, accept: &str) -> Result<HeaderMap, StoreError> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
    headers.insert(ACCEPT, HeaderValue::from_str(accept)?);
    Ok(headers)
}

/// Send a request and turn non-success statuses into errors carrying the response body.
async fn send(request: RequestBuilder) -> Result<Response, StoreError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!(%status, body = %body, "Remote call failed");
    Err(format!("HTTP {status}: {body}").into())
}

/// Quote a value for use inside an OData string literal.
fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// `base` with `path` appended. `set_path` percent-encodes the joined path, so a `#`, `?` or
/// space in a file or folder name stays inside the path instead of ending it.
fn join_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let prefix = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{prefix}/{}", path.trim_start_matches('/')));
    url.set_query(None);
    url.set_fragment(None);
    url
}

fn split_path(path: &str) -> Result<(&str, &str), StoreError> {
    match path.rsplit_once('/') {
        Some((folder, name)) if !name.is_empty() => Ok((folder, name)),
        _ => Err(format!("not a file path: {path}").into()),
    }
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn array<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// `{"value": [{"Title": ..}]}` → titles.
pub fn narrow_list_titles(body: &Value) -> Vec<String> {
    array(body, "value")
        .filter_map(|list| string_field(list, "Title"))
        .collect()
}

/// `{"value": [{"Name", "ServerRelativeUrl", "UniqueId", "TimeCreated"}]}` → folder entries.
pub fn narrow_folder_entries(body: &Value) -> Vec<FolderEntry> {
    array(body, "value")
        .filter_map(|file| {
            Some(FolderEntry {
                name: string_field(file, "Name")?,
                path: string_field(file, "ServerRelativeUrl")?,
                unique_id: string_field(file, "UniqueId"),
                created: string_field(file, "TimeCreated")
                    .or_else(|| string_field(file, "TimeLastModified")),
            })
        })
        .collect()
}

/// List items with an expanded `File` → catalog items. Items without an id are dropped.
pub fn narrow_catalog_items(body: &Value) -> Vec<CatalogItem> {
    array(body, "value")
        .filter_map(|item| {
            Some(CatalogItem {
                id: string_field(item, "Id")?,
                title: string_field(item, "Title"),
                file_name: string_field(item, "FileLeafRef"),
                path: item
                    .get("File")
                    .and_then(|file| string_field(file, "ServerRelativeUrl")),
                created: string_field(item, "Created"),
            })
        })
        .collect()
}

/// Search result table rows (`Cells: [{Key, Value}]`) → hits.
pub fn narrow_search_hits(body: &Value) -> Vec<SearchHit> {
    let rows = body
        .pointer("/PrimaryQueryResult/RelevantResults/Table/Rows")
        .and_then(Value::as_array)
        .into_iter()
        .flatten();

    rows.map(|row| {
        let mut hit = SearchHit::default();
        for cell in array(row, "Cells") {
            let value = string_field(cell, "Value");
            match cell.get("Key").and_then(Value::as_str) {
                Some("Title") => hit.title = value,
                Some("Path") => hit.path = value,
                Some("UniqueId") => hit.unique_id = value,
                Some("LastModifiedTime") | Some("Write") => hit.written = value,
                _ => {}
            }
        }
        hit
    })
    .collect()
}

/// Drive listing → id of the drive named `name`, else the first drive.
pub fn pick_drive(body: &Value, name: &str) -> Option<String> {
    let drives: Vec<&Value> = array(body, "value").collect();
    drives
        .iter()
        .find(|drive| drive.get("name").and_then(Value::as_str) == Some(name))
        .or_else(|| drives.first())
        .and_then(|drive| string_field(drive, "id"))
}

/// REST client for one SharePoint site.
pub struct SharePointClient {
    http: Client,
    site_url: Url,
    token: String,
}

impl SharePointClient {
    pub fn new(site_url: &Url, token: String) -> Self {
        tracing::info!(site_url = %site_url, token_set = !token.is_empty(), "Initialized SharePointClient");
        Self {
            http: Client::new(),
            site_url: site_url.clone(),
            token,
        }
    }

    fn api(&self, path: &str) -> Url {
        join_path(&self.site_url, &format!("_api/{path}"))
    }

    fn get(&self, path: &str) -> Result<RequestBuilder, StoreError> {
        Ok(self
            .http
            .get(self.api(path))
            .headers(auth_headers(&self.token, ODATA_JSON)?))
    }

    fn post(&self, path: &str) -> Result<RequestBuilder, StoreError> {
        Ok(self
            .http
            .post(self.api(path))
            .headers(auth_headers(&self.token, ODATA_JSON)?))
    }
}

#[async_trait]
impl ObjectStore for SharePointClient {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        overwrite: bool,
    ) -> Result<UploadedFile, StoreError> {
        let (folder, name) = split_path(path)?;
        tracing::info!(
            folder,
            name,
            size = bytes.len(),
            sha256 = %content_hash(&bytes),
            "Uploading file"
        );
        let request = self.post(&format!(
            "web/GetFolderByServerRelativePath(decodedurl='{}')/Files/AddUsingPath(decodedurl='{}',overwrite={overwrite})",
            odata_literal(folder),
            odata_literal(name),
        ))?;
        let body: Value = send(request.body(bytes)).await?.json().await?;
        let final_path =
            string_field(&body, "ServerRelativeUrl").unwrap_or_else(|| path.to_string());
        Ok(UploadedFile { final_path })
    }

    async fn copy(
        &self,
        from_path: &str,
        to_path: &str,
        overwrite: bool,
    ) -> Result<(), StoreError> {
        tracing::info!(from = from_path, to = to_path, "Copying file");
        let request = self.post(&format!(
            "web/GetFileByServerRelativePath(decodedurl='{}')/CopyTo(strNewUrl='{}',bOverWrite={overwrite})",
            odata_literal(from_path),
            odata_literal(to_path),
        ))?;
        send(request).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        tracing::info!(path, "Deleting file");
        let request = self
            .post(&format!(
                "web/GetFileByServerRelativePath(decodedurl='{}')",
                odata_literal(path)
            ))?
            .header("X-HTTP-Method", "DELETE")
            .header("IF-MATCH", "*");
        send(request).await?;
        Ok(())
    }

    async fn list_folder(&self, path: &str) -> Result<Vec<FolderEntry>, StoreError> {
        let request = self.get(&format!(
            "web/GetFolderByServerRelativePath(decodedurl='{}')/Files",
            odata_literal(path)
        ))?;
        let body: Value = send(request).await?.json().await?;
        Ok(narrow_folder_entries(&body))
    }

    async fn read_text(&self, path: &str) -> Result<String, StoreError> {
        let request = self.get(&format!(
            "web/GetFileByServerRelativePath(decodedurl='{}')/$value",
            odata_literal(path)
        ))?;
        Ok(send(request).await?.text().await?)
    }
}

#[async_trait]
impl Catalog for SharePointClient {
    async fn list_containers(&self) -> Result<Vec<String>, StoreError> {
        let request = self
            .get("web/lists")?
            .query(&[("$filter", "BaseTemplate eq 101"), ("$select", "Title")]);
        let body: Value = send(request).await?.json().await?;
        Ok(narrow_list_titles(&body))
    }

    async fn list_items(
        &self,
        container: &str,
        extension: Option<String>,
    ) -> Result<Vec<CatalogItem>, StoreError> {
        let mut params = vec![
            (
                "$select".to_string(),
                "Id,Title,FileLeafRef,Created,File/ServerRelativeUrl".to_string(),
            ),
            ("$expand".to_string(), "File".to_string()),
        ];
        if let Some(extension) = extension {
            params.push((
                "$filter".to_string(),
                format!("substringof('{}',FileLeafRef)", odata_literal(&extension)),
            ));
        }
        let request = self
            .get(&format!(
                "web/lists/getbytitle('{}')/items",
                odata_literal(container)
            ))?
            .query(&params);
        let body: Value = send(request).await?.json().await?;
        Ok(narrow_catalog_items(&body))
    }

    async fn search(&self, query: SearchQuery) -> Result<Vec<SearchHit>, StoreError> {
        tracing::debug!(query = %query.query_text, row_limit = query.row_limit, "Running search");
        let request = self.get("search/query")?.query(&[
            ("querytext", format!("'{}'", odata_literal(&query.query_text))),
            ("rowlimit", query.row_limit.to_string()),
            ("trimduplicates", query.trim_duplicates.to_string()),
            (
                "selectproperties",
                "'Title,Path,UniqueId,LastModifiedTime'".to_string(),
            ),
        ]);
        let body: Value = send(request).await?.json().await?;
        Ok(narrow_search_hits(&body))
    }
}

/// Microsoft Graph client used for the document-API persistence tier.
pub struct GraphClient {
    http: Client,
    base: Url,
    /// `{hostname}:{server-relative site path}`, Graph's path-based site address.
    site_address: String,
    token: String,
}

impl GraphClient {
    pub fn new(site_url: &Url, token: String) -> Result<Self, StoreError> {
        let host = site_url
            .host_str()
            .ok_or_else(|| format!("site url has no host: {site_url}"))?;
        let site_address = format!("{host}:{}", site_url.path().trim_end_matches('/'));
        tracing::info!(site_address = %site_address, "Initialized GraphClient");
        Ok(Self {
            http: Client::new(),
            base: Url::parse(GRAPH_BASE)?,
            site_address,
            token,
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value, StoreError> {
        let request = self
            .http
            .get(join_path(&self.base, path))
            .headers(auth_headers(&self.token, "application/json")?);
        Ok(send(request).await?.json().await?)
    }
}

#[async_trait]
impl DocumentApi for GraphClient {
    async fn resolve_container(&self, container_name: &str) -> Result<ContainerId, StoreError> {
        let site = self.get_json(&format!("/sites/{}", self.site_address)).await?;
        let site_id = string_field(&site, "id").ok_or("site response without id")?;

        let drives = self.get_json(&format!("/sites/{site_id}/drives")).await?;
        let drive_id = pick_drive(&drives, container_name)
            .ok_or_else(|| format!("no drive available for {container_name}"))?;
        tracing::info!(container = container_name, %drive_id, "Resolved drive");
        Ok(ContainerId { site_id, drive_id })
    }

    async fn create_text_file(
        &self,
        container: &ContainerId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedFile, StoreError> {
        let url = join_path(
            &self.base,
            &format!(
                "sites/{}/drives/{}/root:/{file_name}:/content",
                container.site_id, container.drive_id
            ),
        );
        tracing::info!(file_name, size = bytes.len(), "Creating file through Graph");
        let request = self
            .http
            .put(url)
            .headers(auth_headers(&self.token, "application/json")?)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(bytes);
        let body: Value = send(request).await?.json().await?;
        let final_path = string_field(&body, "webUrl").unwrap_or_else(|| file_name.to_string());
        Ok(UploadedFile { final_path })
    }
}
