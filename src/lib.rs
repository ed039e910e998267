//! # Playground Sandbox
//!
//! A live-preview code playground: three source buffers (markup, style,
//! script) are composed into one HTML document and hosted in an isolated
//! deno_core runtime.
//!
//! ## Isolation
//!
//! User code is never sanitized. It runs as written, and the boundary is the
//! host:
//!
//! - **Fresh isolate per run**: nothing survives from one preview to the next
//! - **No filesystem, env or shell**: only the ops in `playground_page` exist
//! - **Imports sandboxed**: `import` only resolves same-origin `blob:` URLs
//! - **Fetch allowlisted**: network fetch is off unless origins are configured
//! - **Storage is per page**: `localStorage` lives and dies with the isolate
//! - **Runaway pages terminated**: heap limit plus a wall-clock page budget
//!
//! ## Usage
//!
//! ```rust,ignore
//! use playground_sandbox::{BlobRenderer, ExecutionController, HtmlComposer, SandboxConfig, Settings};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SandboxConfig::default();
//!     let renderer = Arc::new(BlobRenderer::new(&config).unwrap());
//!     let ctl = ExecutionController::mount(
//!         Arc::new(HtmlComposer),
//!         renderer,
//!         &Settings::default(),
//!         config,
//!     )
//!     .unwrap();
//!
//!     ctl.wait_idle().await;
//!     println!("{:?}", ctl.last_report());
//! }
//! ```

mod blob;
mod buffers;
mod compose;
mod config;
mod controller;
mod error;
mod fetch;
mod format;
mod host;
mod library;
mod loader;
pub mod logging;
mod ops;
mod renderer;
mod session;
mod settings;

pub use blob::{Blob, BlobStore, ObjectUrl};
pub use buffers::{BufferStats, SourceBuffers, Tab};
pub use compose::{compose_document, inner_body, ComposedDocument, Composer, HtmlComposer};
pub use config::{RunPolicy, SandboxConfig, SettleStrategy};
pub use controller::{ExecutionController, ExecutionState, FormatOutcome, RunOutcome};
pub use error::{
    ComposeError, FormatError, LibraryError, PlaygroundError, RenderError, SessionError,
};
pub use fetch::FetchConfig;
pub use format::{format_markup, format_source, format_style};
pub use host::{create_page_runtime, LoadReport, LoadStatus, PreviewHost};
pub use library::{find_example, reset_template, starter_template, Example, EXAMPLES};
pub use loader::BlobModuleLoader;
pub use ops::ConsoleOutput;
pub use renderer::{BlobRenderer, ContentHandle, IsolatedRenderer, Presentation, PreviewPane};
pub use session::{write_response, Request, Session};
pub use settings::{
    DeviceClass, DeviceGate, LayoutMode, PreviewMode, Settings, DESKTOP_ONLY_NOTICE,
};
