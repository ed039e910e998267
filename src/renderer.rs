//! Isolated renderer - publishes documents and points the preview at them.

use crate::blob::{BlobStore, ObjectUrl};
use crate::compose::ComposedDocument;
use crate::config::SandboxConfig;
use crate::error::RenderError;
use crate::host::{LoadReport, PreviewHost};
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;

/// The transient resource backing one hosted document.
pub type ContentHandle = ObjectUrl;

/// Result of handing a document to a renderer.
#[derive(Debug)]
pub struct Presentation {
    pub handle: ContentHandle,
    /// Fires once the hosted page has loaded, if the renderer can tell.
    pub loaded: Option<oneshot::Receiver<LoadReport>>,
}

/// Hosts composed documents behind a boundary the page cannot cross.
///
/// Each `present` replaces the hosted content wholesale. The caller owns the
/// returned handle and must hand it back to `release` exactly once.
pub trait IsolatedRenderer: Send + Sync {
    fn present(&self, document: ComposedDocument) -> Result<Presentation, RenderError>;

    fn release(&self, handle: &ContentHandle) -> Result<(), RenderError>;
}

/// The single hosting surface: whatever URL it currently shows.
#[derive(Debug, Default)]
pub struct PreviewPane {
    src: Mutex<Option<ObjectUrl>>,
}

impl PreviewPane {
    pub fn show(&self, url: ObjectUrl) {
        *self.src.lock().unwrap_or_else(PoisonError::into_inner) = Some(url);
    }

    pub fn current(&self) -> Option<ObjectUrl> {
        self.src.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Publishes documents as object URLs and loads them in the preview host.
pub struct BlobRenderer {
    store: BlobStore,
    pane: PreviewPane,
    host: PreviewHost,
}

impl BlobRenderer {
    pub fn new(config: &SandboxConfig) -> Result<Self, RenderError> {
        let store = BlobStore::new(config.blob_origin.clone());
        let host = PreviewHost::spawn(config.clone(), store.clone())?;
        Ok(Self {
            store,
            pane: PreviewPane::default(),
            host,
        })
    }

    pub fn store(&self) -> &BlobStore {
        &self.store
    }

    pub fn pane(&self) -> &PreviewPane {
        &self.pane
    }
}

impl IsolatedRenderer for BlobRenderer {
    fn present(&self, document: ComposedDocument) -> Result<Presentation, RenderError> {
        let digest = document.digest();
        let url = self
            .store
            .create_object_url(document.into_bytes(), "text/html")?;
        self.pane.show(url.clone());

        match self.host.navigate(url.clone(), digest) {
            Ok(loaded) => Ok(Presentation {
                handle: url,
                loaded: Some(loaded),
            }),
            Err(e) => {
                // Nothing will ever load it, so nothing will release it later
                let _ = self.store.revoke(&url);
                Err(e)
            }
        }
    }

    fn release(&self, handle: &ContentHandle) -> Result<(), RenderError> {
        self.store.revoke(handle)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::SourceBuffers;
    use crate::compose::compose_document;
    use crate::host::LoadStatus;

    #[test]
    fn test_pane_keeps_latest_url() {
        let pane = PreviewPane::default();
        let store = BlobStore::new("http://preview.localhost");
        let first = store.create_object_url(Vec::<u8>::new(), "text/html").unwrap();
        let second = store.create_object_url(Vec::<u8>::new(), "text/html").unwrap();

        pane.show(first);
        pane.show(second.clone());
        assert_eq!(pane.current(), Some(second));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blob_renderer_round_trip() {
        let renderer = BlobRenderer::new(&SandboxConfig::default()).unwrap();
        let doc = compose_document(&SourceBuffers::new("<p>x</p>", "", "console.log('hosted')"));

        let presentation = renderer.present(doc).unwrap();
        assert_eq!(renderer.pane().current().as_ref(), Some(&presentation.handle));
        assert!(renderer.store().resolve(presentation.handle.as_str()).is_some());

        let report = presentation.loaded.unwrap().await.unwrap();
        assert_eq!(report.status, LoadStatus::Loaded);
        assert_eq!(report.console.logs, vec!["hosted"]);

        renderer.release(&presentation.handle).unwrap();
        assert!(renderer.store().is_empty());
        assert!(renderer.release(&presentation.handle).is_err());
    }
}
