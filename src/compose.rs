//! Sandbox composer - merges the three source buffers into one document.
//!
//! Nothing is escaped or sanitized. The playground is a single-user tool and
//! the author is trusted; isolation is the renderer's job, not the composer's.

use crate::buffers::SourceBuffers;
use crate::error::ComposeError;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

/// Everything from the doctype through the opening `<body ...>` tag.
static DOCUMENT_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!DOCTYPE html>.*?<body[^>]*>").expect("Invalid document head regex")
});

/// The closing `</body>` through `</html>`.
static DOCUMENT_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)</body>.*?</html>").expect("Invalid document tail regex")
});

/// A complete HTML document ready to hand to a renderer.
///
/// Built once per run from a snapshot of the buffers and dropped after the
/// handoff; later edits never reach a document that already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedDocument(String);

impl ComposedDocument {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_bytes()
    }

    /// Hex SHA-256 of the document, used to correlate runs in logs.
    pub fn digest(&self) -> String {
        digest_hex(self.0.as_bytes())
    }
}

impl From<ComposedDocument> for String {
    fn from(doc: ComposedDocument) -> Self {
        doc.0
    }
}

fn digest_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Turns source buffers into a document.
pub trait Composer: Send + Sync {
    fn compose(&self, buffers: &SourceBuffers) -> Result<ComposedDocument, ComposeError>;
}

/// The standard composer: fixed head, user style, normalized body, user script.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlComposer;

impl Composer for HtmlComposer {
    fn compose(&self, buffers: &SourceBuffers) -> Result<ComposedDocument, ComposeError> {
        Ok(compose_document(buffers))
    }
}

/// Strip a surrounding document wrapper from `markup`, leaving the body fragment.
///
/// A bare fragment comes back unchanged.
pub fn inner_body(markup: &str) -> String {
    let without_head = DOCUMENT_HEAD.replace_all(markup, "");
    DOCUMENT_TAIL.replace_all(&without_head, "").into_owned()
}

pub fn compose_document(buffers: &SourceBuffers) -> ComposedDocument {
    let body = inner_body(&buffers.markup);

    let mut html = String::with_capacity(
        DOCUMENT_OVERHEAD + body.len() + buffers.style.len() + buffers.script.len(),
    );
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str("<meta charset=\"UTF-8\">\n");
    html.push_str(
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    html.push_str("<title>Code Playground Result</title>\n");
    html.push_str("<style>");
    html.push_str(&buffers.style);
    html.push_str("</style>\n</head>\n<body>\n");
    html.push_str(&body);
    html.push_str("\n<script>");
    html.push_str(&buffers.script);
    html.push_str("</script>\n</body>\n</html>\n");

    ComposedDocument(html)
}

const DOCUMENT_OVERHEAD: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(doc: &ComposedDocument) -> &str {
        let html = doc.as_str();
        let start = html.find("<body>").unwrap() + "<body>".len();
        let end = html.find("<script>").unwrap();
        &html[start..end]
    }

    #[test]
    fn test_concrete_scenario() {
        let buffers = SourceBuffers::new("<h1>Hi</h1>", "h1{color:red}", "console.log(1)");
        let doc = HtmlComposer.compose(&buffers).unwrap();

        assert!(doc.as_str().contains("<style>h1{color:red}</style>"));
        assert!(doc.as_str().contains("<script>console.log(1)</script>"));
        assert!(body_of(&doc).contains("<h1>Hi</h1>"));
    }

    #[test]
    fn test_composition_is_idempotent() {
        let buffers = SourceBuffers::new("<p>x</p>", "p { margin: 0 }", "let a = 1;");
        let first = compose_document(&buffers);
        let second = compose_document(&buffers);
        assert_eq!(first, second);
        assert_eq!(first.digest(), second.digest());
    }

    #[test]
    fn test_fragment_and_document_agree() {
        let fragment = SourceBuffers::new("<p>hi</p>", "", "");
        let document = SourceBuffers::new(
            "<!DOCTYPE html><html><head></head><body><p>hi</p></body></html>",
            "",
            "",
        );
        assert_eq!(
            body_of(&compose_document(&fragment)),
            body_of(&compose_document(&document))
        );
    }

    #[test]
    fn test_empty_buffers() {
        let doc = HtmlComposer.compose(&SourceBuffers::default()).unwrap();
        assert!(doc.as_str().contains("<html>"));
        assert!(doc.as_str().contains("<body>"));
        assert!(doc.as_str().contains("<style></style>"));
        assert!(doc.as_str().contains("<script></script>"));
    }

    #[test]
    fn test_multiline_head_and_body_attributes() {
        let markup = "<!doctype HTML>\n<html lang=\"en\">\n<head>\n  <title>x</title>\n</head>\n<BODY class=\"dark\"\n data-x=\"1\">\n<main>ok</main>\n</BODY>\n</html>";
        let body = inner_body(markup);
        assert_eq!(body.trim(), "<main>ok</main>");
    }

    #[test]
    fn test_user_head_is_not_kept() {
        let markup = "<!DOCTYPE html><html><head><title>mine</title></head><body>x</body></html>";
        let doc = compose_document(&SourceBuffers::new(markup, "", ""));
        assert!(!doc.as_str().contains("<title>mine</title>"));
        assert!(doc.as_str().contains("<title>Code Playground Result</title>"));
    }

    #[test]
    fn test_no_escaping() {
        let buffers = SourceBuffers::new("<b>&amp;</b>", "a::after{content:'</style>'}", "");
        let doc = compose_document(&buffers);
        assert!(doc.as_str().contains("<b>&amp;</b>"));
        assert!(doc.as_str().contains("content:'</style>'"));
    }
}
