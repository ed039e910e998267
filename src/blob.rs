//! In-memory object URL store.
//!
//! Each composed document is published under a `blob:<origin>/<uuid>` URL.
//! The URL stays resolvable until it is revoked; the controller revokes it
//! once the hosted page has had its chance to load.

use crate::error::RenderError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use url::Url;

/// Handle to a published document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    /// Accept any `blob:` URL string. Whether it is live is the store's call.
    pub fn parse(url: &str) -> Option<Self> {
        url.starts_with("blob:").then(|| Self(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Origin serialization of the URL the blob was minted under.
    pub fn origin(&self) -> Option<String> {
        Url::parse(&self.0)
            .ok()
            .map(|url| url.origin().ascii_serialization())
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Blob {
    pub content_type: String,
    pub data: Arc<[u8]>,
}

/// Shared, thread-safe object URL registry. Clones share one store.
#[derive(Debug, Clone)]
pub struct BlobStore {
    origin: String,
    entries: Arc<Mutex<HashMap<String, Blob>>>,
}

impl BlobStore {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            entries: Arc::default(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn create_object_url(
        &self,
        data: impl Into<Arc<[u8]>>,
        content_type: &str,
    ) -> Result<ObjectUrl, RenderError> {
        let url = format!("blob:{}/{}", self.origin, uuid::Uuid::new_v4());
        let blob = Blob {
            content_type: content_type.to_string(),
            data: data.into(),
        };
        self.entries
            .lock()
            .map_err(|_| RenderError::StorePoisoned)?
            .insert(url.clone(), blob);
        tracing::debug!(%url, "Created object URL");
        Ok(ObjectUrl(url))
    }

    pub fn resolve(&self, url: &str) -> Option<Blob> {
        self.entries.lock().ok()?.get(url).cloned()
    }

    /// Release the blob behind `url`. Revoking twice is an error.
    pub fn revoke(&self, url: &ObjectUrl) -> Result<(), RenderError> {
        let removed = self
            .entries
            .lock()
            .map_err(|_| RenderError::StorePoisoned)?
            .remove(url.as_str());
        match removed {
            Some(_) => {
                tracing::debug!(%url, "Revoked object URL");
                Ok(())
            }
            None => Err(RenderError::UnknownHandle(url.to_string())),
        }
    }

    /// Number of live (unrevoked) URLs.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_resolve_revoke() {
        let store = BlobStore::new("http://preview.localhost/");
        let url = store
            .create_object_url(b"<p>hi</p>".to_vec(), "text/html")
            .unwrap();

        assert!(url.as_str().starts_with("blob:http://preview.localhost/"));
        assert_eq!(url.origin().as_deref(), Some("http://preview.localhost"));

        let blob = store.resolve(url.as_str()).unwrap();
        assert_eq!(&*blob.data, b"<p>hi</p>");
        assert_eq!(blob.content_type, "text/html");
        assert_eq!(store.len(), 1);

        store.revoke(&url).unwrap();
        assert!(store.resolve(url.as_str()).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_double_revoke_is_reported() {
        let store = BlobStore::new("http://preview.localhost");
        let url = store.create_object_url(Vec::<u8>::new(), "text/html").unwrap();
        store.revoke(&url).unwrap();

        assert!(matches!(store.revoke(&url), Err(RenderError::UnknownHandle(_))));
    }

    #[test]
    fn test_urls_are_unique() {
        let store = BlobStore::new("http://preview.localhost");
        let a = store.create_object_url(Vec::<u8>::new(), "text/html").unwrap();
        let b = store.create_object_url(Vec::<u8>::new(), "text/html").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }
}
