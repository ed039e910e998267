//! Sandboxed fetch for hosted pages.
//!
//! Security model:
//! - `blob:` URLs resolve only when minted under the page's own origin
//! - Network URLs must match an allowed origin (none by default)
//! - Redirects only followed if they stay within the same origin

use crate::blob::BlobStore;
use anyhow::anyhow;
use deno_core::{op2, OpState};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use url::Url;

/// Configuration for fetch allowlist
#[derive(Debug, Clone, Default)]
pub struct FetchConfig {
    /// Allowed origins (e.g., "https://api.example.com")
    /// An origin is scheme + host + port
    pub allowed_origins: Vec<String>,
}

impl FetchConfig {
    pub fn is_origin_allowed(&self, url: &Url) -> bool {
        if self.allowed_origins.is_empty() {
            return false;
        }
        let origin = url.origin().ascii_serialization();
        self.allowed_origins.iter().any(|allowed| origin == *allowed)
    }
}

/// Request info passed from JS
#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Response info returned to JS
#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub ok: bool,
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub url: String,
    pub body: String,
}

/// The fetch operation - routes blob URLs to the page's store, others to the network
#[op2(async)]
#[serde]
pub async fn op_fetch(
    state: Rc<RefCell<OpState>>,
    #[serde] request: FetchRequest,
) -> Result<FetchResponse, deno_core::error::AnyError> {
    let (config, store) = {
        let state_ref = state.borrow();
        (
            state_ref.borrow::<FetchConfig>().clone(),
            state_ref.borrow::<BlobStore>().clone(),
        )
    };

    let url = Url::parse(&request.url)
        .map_err(|e| anyhow!("Invalid URL '{}': {}", request.url, e))?;

    if url.scheme() == "blob" {
        return fetch_blob(&store, &url);
    }

    do_fetch(request, config).await
}

/// Same-origin blob read. Anything minted elsewhere, or already revoked, is a network error.
fn fetch_blob(store: &BlobStore, url: &Url) -> Result<FetchResponse, deno_core::error::AnyError> {
    let page_origin = Url::parse(store.origin())
        .map(|origin| origin.origin().ascii_serialization())
        .map_err(|e| anyhow!("Invalid page origin '{}': {}", store.origin(), e))?;
    let origin = url.origin().ascii_serialization();

    if origin != page_origin {
        return Err(anyhow!(
            "Fetch blocked: blob origin '{}' does not match page origin '{}'",
            origin,
            page_origin
        ));
    }

    let blob = store
        .resolve(url.as_str())
        .ok_or_else(|| anyhow!("Failed to fetch: {} has been revoked", url))?;

    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), blob.content_type.clone());
    headers.insert("content-length".to_string(), blob.data.len().to_string());

    Ok(FetchResponse {
        ok: true,
        status: 200,
        status_text: "OK".to_string(),
        headers,
        url: url.to_string(),
        body: String::from_utf8_lossy(&blob.data).into_owned(),
    })
}

/// Internal fetch implementation (can be called recursively for redirects)
async fn do_fetch(
    request: FetchRequest,
    config: FetchConfig,
) -> Result<FetchResponse, deno_core::error::AnyError> {
    let url = Url::parse(&request.url)
        .map_err(|e| anyhow!("Invalid URL '{}': {}", request.url, e))?;

    if !config.is_origin_allowed(&url) {
        return Err(anyhow!(
            "Fetch blocked: origin '{}' is not in the allowlist. Allowed: {:?}",
            url.origin().ascii_serialization(),
            config.allowed_origins
        ));
    }

    let client = Client::builder()
        // Redirects are checked against the allowlist below
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

    let method = match request.method.as_deref().unwrap_or("GET").to_uppercase().as_str() {
        "GET" => Method::GET,
        "POST" => Method::POST,
        "PUT" => Method::PUT,
        "DELETE" => Method::DELETE,
        "PATCH" => Method::PATCH,
        "HEAD" => Method::HEAD,
        "OPTIONS" => Method::OPTIONS,
        other => return Err(anyhow!("Unsupported HTTP method: {}", other)),
    };

    let mut req_builder = client.request(method, url.clone());

    if let Some(ref headers) = request.headers {
        for (key, value) in headers {
            req_builder = req_builder.header(key, value);
        }
    }

    if let Some(body) = request.body {
        req_builder = req_builder.body(body);
    }

    let response = req_builder
        .send()
        .await
        .map_err(|e| anyhow!("Fetch failed: {}", e))?;

    let status = response.status();
    let final_url = response.url().clone();

    if status.is_redirection() {
        if let Some(location) = response.headers().get("location") {
            let location_str = location.to_str().map_err(|_| anyhow!("Invalid redirect location"))?;
            let redirect_url = final_url
                .join(location_str)
                .map_err(|e| anyhow!("Invalid redirect URL: {}", e))?;

            if redirect_url.origin() != url.origin() {
                return Err(anyhow!(
                    "Fetch blocked: redirect to different origin '{}' (original: '{}')",
                    redirect_url.origin().ascii_serialization(),
                    url.origin().ascii_serialization()
                ));
            }

            let redirect_request = FetchRequest {
                url: redirect_url.to_string(),
                method: Some("GET".to_string()), // Redirects typically become GET
                headers: request.headers.clone(),
                body: None,
            };

            return Box::pin(do_fetch(redirect_request, config)).await;
        }
    }

    let mut resp_headers = HashMap::new();
    for (key, value) in response.headers() {
        if let Ok(v) = value.to_str() {
            resp_headers.insert(key.to_string(), v.to_string());
        }
    }

    let body = response
        .text()
        .await
        .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

    Ok(FetchResponse {
        ok: status.is_success(),
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
        headers: resp_headers,
        url: final_url.to_string(),
        body,
    })
}
