//! HTTP client for the producer's sync API.
//!
//! The producer exposes:
//!
//! - `GET {files}?since=<ISO8601>`: delta files published after a timestamp (JSON:API)
//! - `GET {download}` with `:id` replaced by a file id: the file itself
//! - `GET {datasets}?filter[subject]=..&filter[:has-no:next-version]=yes`: the latest dump
//!
//! When a login endpoint and secret key are configured, requests carry a session cookie
//! obtained with `POST {login}` and a `key` header.

use crate::core::DeltaMessage;
use crate::parsing::changeset_parser::parse_delta_message;
use crate::sources::delta_source::{unconsumed, DeltaFile, DeltaSource};
use crate::sources::dump_file::{DumpFile, DumpSource};
use crate::sources::SourceError;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{ACCEPT, COOKIE, SET_COOKIE};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const JSON_API: &str = "application/vnd.api+json";

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub base_url: String,
    pub files_path: String,
    /// Download path, `:id` is replaced by the file id.
    pub download_path: String,
    pub dataset_path: String,
    pub dataset_subject: Option<String>,
    pub login_endpoint: Option<String>,
    pub secret_key: Option<String>,
    pub delta_file_folder: PathBuf,
    pub dump_file_folder: PathBuf,
    pub keep_delta_files: bool,
    pub timeout: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://producer".to_string(),
            files_path: "/sync/files".to_string(),
            download_path: "/files/:id/download".to_string(),
            dataset_path: "/datasets".to_string(),
            dataset_subject: None,
            login_endpoint: None,
            secret_key: None,
            delta_file_folder: PathBuf::from("/consumer-files"),
            dump_file_folder: PathBuf::from("/consumer-files/dumps"),
            keep_delta_files: false,
            timeout: Duration::from_secs(300),
        }
    }
}

impl ProducerConfig {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    pub fn files_endpoint(&self) -> String {
        self.url(&self.files_path)
    }

    pub fn download_url(&self, id: &str) -> String {
        self.url(&self.download_path.replace(":id", id))
    }

    pub fn dataset_endpoint(&self) -> String {
        self.url(&self.dataset_path)
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.login_endpoint, &self.secret_key) {
            (Some(endpoint), Some(key)) => Some((endpoint, key)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonApiList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct FileResource {
    id: String,
    attributes: FileAttributes,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileAttributes {
    created: String,
    name: String,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatasetResource {
    attributes: DatasetAttributes,
    relationships: DatasetRelationships,
}

#[derive(Debug, Deserialize)]
struct DatasetAttributes {
    #[serde(rename = "release-date")]
    release_date: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatasetRelationships {
    distributions: RelatedLinks,
}

#[derive(Debug, Deserialize)]
struct RelatedLinks {
    links: Related,
}

#[derive(Debug, Deserialize)]
struct Related {
    related: String,
}

#[derive(Debug, Deserialize)]
struct DistributionResource {
    relationships: DistributionRelationships,
}

#[derive(Debug, Deserialize)]
struct DistributionRelationships {
    subject: ResourceLink,
}

#[derive(Debug, Deserialize)]
struct ResourceLink {
    data: ResourceIdentifier,
}

#[derive(Debug, Deserialize)]
struct ResourceIdentifier {
    id: String,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, SourceError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SourceError::Decode(format!("invalid timestamp '{}': {}", value, e)))
}

fn session_cookie(response: &Response) -> Option<String> {
    let header = response.headers().get(SET_COOKIE)?.to_str().ok()?;
    header.split(';').next().map(|cookie| cookie.trim().to_string())
}

/// The producer names delta files; a name must stay inside the folder it is joined to.
fn local_name(file: &DeltaFile) -> Result<&Path, SourceError> {
    let name = Path::new(&file.name);
    let mut components = name.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(SourceError::UnsafeFileName(file.name.clone())),
    }
}

fn check_status(url: &str, response: Response) -> Result<Response, SourceError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(SourceError::Status { url: url.to_string(), status: response.status().as_u16() })
    }
}

pub struct ProducerClient {
    config: ProducerConfig,
    client: Client,
    cookie: Mutex<Option<String>>,
}

impl ProducerClient {
    pub fn new(config: ProducerConfig) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client, cookie: Mutex::new(None) })
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    async fn login(&self, endpoint: &str, key: &str) -> Result<String, SourceError> {
        debug!(endpoint, "logging in at producer");
        let response = self
            .client
            .post(endpoint)
            .header("key", key)
            .header(ACCEPT, JSON_API)
            .send()
            .await
            .map_err(|e| SourceError::Login(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SourceError::Login(format!("login responded with {}", response.status())));
        }
        let cookie = session_cookie(&response).unwrap_or_default();
        info!("logged in at producer");
        Ok(cookie)
    }

    async fn send(&self, url: &str, accept: &str, cookie: Option<&str>) -> Result<Response, SourceError> {
        let mut request = self.client.get(url).header(ACCEPT, accept);
        if let Some(cookie) = cookie.filter(|c| !c.is_empty()) {
            request = request.header(COOKIE, cookie);
        }
        Ok(request.send().await?)
    }

    async fn authenticated_send(
        &self,
        url: &str,
        accept: &str,
        endpoint: &str,
        key: &str,
    ) -> Result<Response, SourceError> {
        let mut cookie = self.cookie.lock().await;
        if cookie.is_none() {
            *cookie = Some(self.login(endpoint, key).await?);
        }
        let mut response = self.send(url, accept, cookie.as_deref()).await?;

        if response.status() == StatusCode::BAD_REQUEST {
            warn!(url, "producer rejected the session, logging in again");
            *cookie = Some(self.login(endpoint, key).await?);
            response = self.send(url, accept, cookie.as_deref()).await?;
        }
        if let Some(refreshed) = session_cookie(&response) {
            *cookie = Some(refreshed);
        }
        Ok(response)
    }

    /// GET `url`, with the session cookie when authentication is configured.
    pub async fn get(&self, url: &str, accept: &str) -> Result<Response, SourceError> {
        let response = match self.config.credentials() {
            Some((endpoint, key)) => self.authenticated_send(url, accept, endpoint, key).await?,
            None => self.send(url, accept, None).await?,
        };
        check_status(url, response)
    }

    async fn download_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let response = self.get(url, "*/*").await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn keep_or_remove(&self, file: &DeltaFile, downloaded: &Path) -> Result<(), SourceError> {
        if !self.config.keep_delta_files {
            tokio::fs::remove_file(downloaded).await?;
            return Ok(());
        }
        let directory = self.config.delta_file_folder.join(file.day_folder());
        tokio::fs::create_dir_all(&directory).await?;
        let kept = directory.join(local_name(file)?);
        if tokio::fs::try_exists(&kept).await? {
            tokio::fs::remove_file(downloaded).await?;
        } else {
            tokio::fs::rename(downloaded, &kept).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DeltaSource for ProducerClient {
    async fn files_since(&self, since: DateTime<Utc>) -> Result<Vec<DeltaFile>, SourceError> {
        let url = format!(
            "{}?since={}",
            self.config.files_endpoint(),
            since.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        debug!(url = %url, "fetching unconsumed delta files");
        let list: JsonApiList<FileResource> =
            self.get(&url, JSON_API).await?.json().await.map_err(|e| SourceError::Decode(e.to_string()))?;

        let files = list
            .data
            .into_iter()
            .map(|resource| {
                Ok(DeltaFile {
                    created: parse_timestamp(&resource.attributes.created)?,
                    format: resource.attributes.format.or(resource.format),
                    name: resource.attributes.name,
                    id: resource.id,
                })
            })
            .collect::<Result<Vec<_>, SourceError>>()?;
        Ok(unconsumed(files, since))
    }

    async fn load(&self, file: &DeltaFile) -> Result<DeltaMessage, SourceError> {
        let name = local_name(file)?;
        let bytes = self.download_bytes(&self.config.download_url(&file.id)).await?;
        tokio::fs::create_dir_all(&self.config.delta_file_folder).await?;
        let downloaded = self.config.delta_file_folder.join(name);
        tokio::fs::write(&downloaded, &bytes).await?;
        if file.is_gzip() {
            debug!(file = %file.name, "delta file is gzipped");
        }

        let message = match parse_delta_message(&bytes) {
            Ok(message) => message,
            Err(e) => {
                tokio::fs::remove_file(&downloaded).await?;
                return Err(e.into());
            }
        };
        info!(file = %file.name, changesets = message.len(), "loaded delta file");
        self.keep_or_remove(file, &downloaded).await?;
        Ok(message)
    }

    async fn remove_file(&self, file: &DeltaFile) -> Result<(), SourceError> {
        let Ok(name) = local_name(file) else {
            warn!(file = %file.name, "unsafe delta file name, nothing was kept for it");
            return Ok(());
        };
        let path = self.config.delta_file_folder.join(file.day_folder()).join(name);
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(&path).await?;
        } else {
            warn!(path = %path.display(), "no kept delta file found");
        }
        Ok(())
    }
}

#[async_trait]
impl DumpSource for ProducerClient {
    async fn latest_dump(&self) -> Result<Option<DumpFile>, SourceError> {
        let subject = self.config.dataset_subject.as_deref().unwrap_or_default();
        let url = format!(
            "{}?filter[subject]={}&filter[:has-no:next-version]=yes",
            self.config.dataset_endpoint(),
            subject
        );
        info!(url = %url, "retrieving latest dataset");
        let datasets: JsonApiList<DatasetResource> =
            self.get(&url, JSON_API).await?.json().await.map_err(|e| SourceError::Decode(e.to_string()))?;
        let Some(dataset) = datasets.data.into_iter().next() else {
            return Ok(None);
        };

        let distribution_url =
            format!("{}?include=subject", self.config.url(&dataset.relationships.distributions.links.related));
        debug!(url = %distribution_url, "retrieving distribution");
        let distributions: JsonApiList<DistributionResource> = self
            .get(&distribution_url, JSON_API)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        let distribution = distributions
            .data
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::Decode("dataset without distribution".to_string()))?;

        let id = distribution.relationships.subject.data.id;
        Ok(Some(DumpFile {
            name: dataset.attributes.title.unwrap_or_else(|| id.clone()),
            created: parse_timestamp(&dataset.attributes.release_date)?,
            id,
        }))
    }

    async fn download_dump(&self, dump: &DumpFile) -> Result<PathBuf, SourceError> {
        let url = self.config.download_url(&dump.id);
        info!(url = %url, "downloading dump");
        let bytes = self.download_bytes(&url).await?;
        tokio::fs::create_dir_all(&self.config.dump_file_folder).await?;
        let path = self.config.dump_file_folder.join(format!("{}.ttl", dump.id));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}
