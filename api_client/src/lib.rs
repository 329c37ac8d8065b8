//! API client module for the Instagram Graph API.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://graph.instagram.com";
pub const MEDIA_FIELDS: &str = "id,caption,media_type,media_url,thumbnail_url,permalink,timestamp,username";

/// Graph API error code for invalid or expired access tokens.
const INVALID_TOKEN_CODE: i64 = 190;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Image,
    Video,
    CarouselAlbum,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MediaItem {
    pub id: String,
    pub media_type: MediaType,
    /// Absent for media flagged for copyright.
    pub media_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub caption: Option<String>,
    pub permalink: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    pub username: Option<String>,
}

impl MediaItem {
    /// URL of a still image suitable for a grid tile, if Instagram sent one.
    pub fn preview_url(&self) -> Option<&str> {
        let media = self.media_url.as_deref();
        let thumb = self.thumbnail_url.as_deref();
        match self.media_type {
            MediaType::Video => thumb.or(media),
            _ => media.or(thumb),
        }
    }

    /// Images and carousels (whose `media_url` is the cover image).
    pub fn is_image(&self) -> bool {
        matches!(self.media_type, MediaType::Image | MediaType::CarouselAlbum)
    }
}

/// Instagram sends `2017-08-31T18:10:00+0000`; RFC 3339 is accepted too so
/// items serialized by this crate read back. Anything else is dropped rather
/// than failing the page.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        match DateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%z").or_else(|_| DateTime::parse_from_rfc3339(&s)) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!("Ignoring unparseable media timestamp {:?}: {}", s, e);
                None
            }
        }
    }))
}

/// One page of the user's media.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaPage {
    pub items: Vec<MediaItem>,
    pub next_cursor: Option<String>,
}

impl MediaPage {
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct Cursors {
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    cursors: Option<Cursors>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListMediaResponse {
    data: Option<Vec<MediaItem>>,
    paging: Option<Paging>,
}

impl ListMediaResponse {
    fn into_page(self) -> MediaPage {
        // `cursors.after` is present on the last page too; only `next` means more.
        let next_cursor = self.paging.and_then(|p| match p.next {
            Some(_) => p.cursors.and_then(|c| c.after),
            None => None,
        });
        MediaPage {
            items: self.data.unwrap_or_default(),
            next_cursor,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    code: Option<i64>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiClientError {
    #[error("Request Error: {0}")]
    RequestError(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Instagram API Error: {0}")]
    InstagramApiError(String),
    #[error("Other Error: {0}")]
    Other(String),
}

fn classify_error(status: StatusCode, body: &str) -> ApiClientError {
    let parsed = serde_json::from_str::<GraphErrorBody>(body).ok();
    let message = parsed
        .as_ref()
        .map(|b| b.error.message.clone())
        .unwrap_or_else(|| format!("{}: {}", status, body));
    let invalid_token = parsed.map(|b| b.error.code == Some(INVALID_TOKEN_CODE)).unwrap_or(false);

    if status == StatusCode::UNAUTHORIZED || invalid_token {
        ApiClientError::Unauthorized(message)
    } else {
        ApiClientError::InstagramApiError(message)
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl ApiClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, DEFAULT_BASE_URL.to_string())
    }

    /// Create a new client with a custom API base URL. Mainly used for testing.
    pub fn with_base_url(access_token: String, base_url: String) -> Self {
        ApiClient {
            client: reqwest::Client::new(),
            access_token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn set_access_token(&mut self, token: String) {
        self.access_token = token;
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ApiClientError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("access_token", self.access_token.as_str())])
            .send()
            .await
            .map_err(|e| ApiClientError::RequestError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            let err = classify_error(status, &error_text);
            tracing::warn!(%status, error = %err, "Instagram API request failed");
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiClientError::RequestError(e.to_string()))?;
        serde_json::from_str::<T>(&body).map_err(|e| {
            tracing::warn!(error = %e, "Unexpected Instagram API response body");
            ApiClientError::InstagramApiError(format!("Malformed response: {}", e))
        })
    }

    /// List the authenticated user's media, newest first.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub async fn list_media(&self, page_size: u32, after: Option<&str>) -> Result<MediaPage, ApiClientError> {
        let limit = page_size.to_string();
        let mut query = vec![("fields", MEDIA_FIELDS), ("limit", limit.as_str())];
        if let Some(cursor) = after {
            query.push(("after", cursor));
        }

        let response: ListMediaResponse = self.get_json("/me/media", &query).await?;
        let page = response.into_page();
        tracing::debug!(count = page.items.len(), more = page.has_more(), "Fetched media page");
        Ok(page)
    }

    pub async fn get_media(&self, id: &str) -> Result<MediaItem, ApiClientError> {
        if id.is_empty() {
            return Err(ApiClientError::Other("Empty media id".into()));
        }
        self.get_json(&format!("/{}", id), &[("fields", MEDIA_FIELDS)]).await
    }
}
