use futures::StreamExt;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::types::{
    Category, CategoryDraft, CategoryList, ChaptersPayload, HistoryPayload, LinkDraft,
    ReorderResponse, StatusResponse, DEFAULT_CATEGORY,
};

/// Table fragments for large categories run to a few MB of markup.
const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024;

/// Errors from the tracker HTTP surface.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Body was not the JSON shape the endpoint promises
    #[error("Invalid response: {0}")]
    Decode(String),
    /// Server answered with `status != "success"`
    #[error("Server rejected {action}: {}", .message.as_deref().unwrap_or("no details"))]
    Rejected {
        action: &'static str,
        message: Option<String>,
    },
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Transport failures leave the page untouched; everything else is the server's answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

/// HTTP client for the tracker server.
///
/// Category-scoped actions are addressed as `/<category>/<action>`, except for
/// the default category which has no prefix. Everything under `/api` is global.
#[derive(Clone)]
pub struct TrackerApi {
    client: reqwest::Client,
    base: Url,
}

impl TrackerApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base = Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chapterwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Path segments for a category-scoped action.
    pub fn action_segments<'a>(category: &'a str, action: &'a str) -> Vec<&'a str> {
        if category.is_empty() || category == DEFAULT_CATEGORY {
            vec![action]
        } else {
            vec![category, action]
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        url.set_query(None);
        Ok(url)
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        tracing::debug!(%method, %url, "Tracker request");
        let mut builder = self.client.request(method, url);
        if let Some(body) = body {
            let bytes = serde_json::to_vec(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(bytes);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::HttpStatus(status.as_u16()));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > MAX_RESPONSE_SIZE {
                return Err(ApiError::ResponseTooLarge);
            }
            body.extend_from_slice(&chunk);
        }

        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn post_action(
        &self,
        category: &str,
        action: &'static str,
        body: Value,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&Self::action_segments(category, action))?;
        let response: StatusResponse = self.request(Method::POST, url, Some(body)).await?;
        expect_success(action, response)
    }

    // ========================================================================
    // Categories
    // ========================================================================

    pub async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        let url = self.endpoint(&["api", "categories"])?;
        let CategoryList(categories) = self.request(Method::GET, url, None).await?;
        Ok(categories)
    }

    /// Persist a new category order. Returns the server's authoritative list.
    pub async fn reorder_categories(&self, order: &[String]) -> Result<Vec<Category>, ApiError> {
        let url = self.endpoint(&["api", "categories", "reorder"])?;
        let response: ReorderResponse = self
            .request(Method::POST, url, Some(json!({ "order": order })))
            .await?;
        if response.status != "success" {
            return Err(ApiError::Rejected {
                action: "reorder categories",
                message: response.error,
            });
        }
        Ok(response.categories)
    }

    pub async fn create_category(&self, draft: &CategoryDraft) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "categories"])?;
        let body = serde_json::to_value(draft).map_err(|e| ApiError::Decode(e.to_string()))?;
        let response: StatusResponse = self.request(Method::POST, url, Some(body)).await?;
        expect_success("create category", response)
    }

    pub async fn update_category(&self, name: &str, draft: &CategoryDraft) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "categories", name])?;
        let body = serde_json::to_value(draft).map_err(|e| ApiError::Decode(e.to_string()))?;
        let response: StatusResponse = self.request(Method::PUT, url, Some(body)).await?;
        expect_success("update category", response)
    }

    pub async fn delete_category(&self, name: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "categories", name])?;
        let response: StatusResponse = self.request(Method::DELETE, url, None).await?;
        expect_success("delete category", response)
    }

    // ========================================================================
    // Table
    // ========================================================================

    pub async fn fetch_chapters(&self, category: &str) -> Result<ChaptersPayload, ApiError> {
        let mut url = self.endpoint(&["api", "chapters"])?;
        url.query_pairs_mut().append_pair("category", category);
        self.request(Method::GET, url, None).await
    }

    // ========================================================================
    // Links
    // ========================================================================

    pub async fn add_link(&self, category: &str, draft: &LinkDraft) -> Result<(), ApiError> {
        let body = serde_json::to_value(draft).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.post_action(category, "add", body).await
    }

    pub async fn edit_link(
        &self,
        category: &str,
        original_url: &str,
        draft: &LinkDraft,
    ) -> Result<(), ApiError> {
        let mut body = serde_json::to_value(draft).map_err(|e| ApiError::Decode(e.to_string()))?;
        if let Value::Object(map) = &mut body {
            map.insert("original_url".to_string(), json!(original_url));
        }
        self.post_action(category, "edit", body).await
    }

    pub async fn remove_link(&self, category: &str, url: &str) -> Result<(), ApiError> {
        self.post_action(category, "remove", json!({ "url": url }))
            .await
    }

    pub async fn recheck(&self, category: &str, url: &str) -> Result<(), ApiError> {
        self.post_action(category, "recheck", json!({ "url": url }))
            .await
    }

    /// Mark the latest found chapter as saved.
    pub async fn update_chapter(
        &self,
        category: &str,
        url: &str,
        timestamp: &str,
    ) -> Result<(), ApiError> {
        self.post_action(
            category,
            "update",
            json!({ "url": url, "timestamp": timestamp }),
        )
        .await
    }

    pub async fn force_update(&self, category: &str) -> Result<(), ApiError> {
        self.post_action(category, "force_update", json!({})).await
    }

    pub async fn set_favorite(
        &self,
        category: &str,
        url: &str,
        favorite: bool,
    ) -> Result<(), ApiError> {
        self.post_action(
            category,
            "favorite",
            json!({ "url": url, "favorite": favorite }),
        )
        .await
    }

    // ========================================================================
    // History
    // ========================================================================

    pub async fn history(&self, category: &str, url: &str) -> Result<HistoryPayload, ApiError> {
        let endpoint = self.endpoint(&Self::action_segments(category, "history"))?;
        self.request(Method::POST, endpoint, Some(json!({ "url": url })))
            .await
    }

    pub async fn set_saved_entry(
        &self,
        category: &str,
        url: &str,
        entry_id: i64,
    ) -> Result<HistoryPayload, ApiError> {
        let mut segments = Self::action_segments(category, "history");
        segments.push("set_saved");
        let endpoint = self.endpoint(&segments)?;
        self.request(
            Method::POST,
            endpoint,
            Some(json!({ "url": url, "entry_id": entry_id })),
        )
        .await
    }

    /// Delete a history entry. Callers gate locked entries first with
    /// [`HistoryPayload::check_deletable`].
    pub async fn delete_history_entry(
        &self,
        category: &str,
        url: &str,
        entry_id: i64,
    ) -> Result<HistoryPayload, ApiError> {
        let mut segments = Self::action_segments(category, "history");
        segments.push("delete");
        let endpoint = self.endpoint(&segments)?;
        self.request(
            Method::POST,
            endpoint,
            Some(json!({ "url": url, "entry_id": entry_id })),
        )
        .await
    }
}

fn expect_success(action: &'static str, response: StatusResponse) -> Result<(), ApiError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(ApiError::Rejected {
            action,
            message: response.error,
        })
    }
}
