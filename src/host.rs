//! Preview host - runs hosted pages in sandboxed V8 isolates.
//!
//! The host owns one OS thread. Every navigation gets a brand new isolate,
//! so nothing a page does survives into the next run, and nothing it does
//! reaches the process hosting the playground:
//! - console output is captured, not printed
//! - no fs, env or process APIs exist
//! - fetch and import only reach the page's own blob origin (plus an
//!   explicit fetch allowlist)
//! - a page runs for at most the configured budget, and a newer navigation
//!   terminates it early

use crate::blob::{BlobStore, ObjectUrl};
use crate::config::SandboxConfig;
use crate::error::RenderError;
use crate::fetch::FetchConfig;
use crate::loader::BlobModuleLoader;
use crate::ops::{playground_page, ConsoleOutput};
use anyhow::{anyhow, Error};
use deno_core::{v8, JsRuntime, ModuleSpecifier, PollEventLoopOptions, RuntimeOptions};
use regex::Regex;
use serde::Serialize;
use std::rc::Rc;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

// Comments are matched as a whole so scripts inside them are skipped, and a
// `<!--` inside a script body stays part of that script.
static SCRIPT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<script\b([^>]*)>(.*?)</script\s*>")
        .expect("Invalid script tag regex")
});

static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("Invalid comment regex"));

static TITLE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").expect("Invalid title tag regex")
});

static TYPE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\btype\s*=\s*["']?([^"'\s>]*)"#).expect("Invalid type attribute regex")
});

static SRC_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bsrc\s*=\s*["']?([^"'\s>]+)"#).expect("Invalid src attribute regex")
});

/// How a navigation ended, as far as load is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum LoadStatus {
    Loaded,
    Failed(String),
    /// A newer navigation arrived before this one started.
    Superseded,
}

/// What the host observed while loading a page.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub url: String,
    pub digest: String,
    pub title: Option<String>,
    pub scripts: usize,
    pub console: ConsoleOutput,
    #[serde(flatten)]
    pub status: LoadStatus,
}

impl LoadReport {
    pub(crate) fn new(url: &ObjectUrl, digest: String, status: LoadStatus) -> Self {
        Self {
            url: url.to_string(),
            digest,
            title: None,
            scripts: 0,
            console: ConsoleOutput::default(),
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptKind {
    Classic,
    Module,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PageScript {
    kind: ScriptKind,
    source: String,
}

/// A parsed page: title plus runnable scripts in document order.
#[derive(Debug, Default)]
struct PageDocument {
    title: Option<String>,
    scripts: Vec<PageScript>,
    blocked: Vec<String>,
}

impl PageDocument {
    fn parse(html: &str, store: &BlobStore) -> Self {
        let mut page = PageDocument {
            title: TITLE_TAG
                .captures(&HTML_COMMENT.replace_all(html, ""))
                .map(|caps| caps[1].trim().to_string()),
            ..Default::default()
        };

        for caps in SCRIPT_TAG.captures_iter(html) {
            let Some(attrs) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            let kind = match TYPE_ATTR
                .captures(attrs)
                .map(|t| t[1].to_ascii_lowercase())
                .as_deref()
            {
                None | Some("") | Some("text/javascript") | Some("application/javascript") => {
                    ScriptKind::Classic
                }
                Some("module") => ScriptKind::Module,
                // Data blocks and templates are not executed
                Some(_) => continue,
            };

            let source = match SRC_ATTR.captures(attrs) {
                Some(src) => match resolve_script_src(&src[1], store) {
                    Ok(code) => code,
                    Err(reason) => {
                        page.blocked.push(reason);
                        continue;
                    }
                },
                None => caps[2].to_string(),
            };

            page.scripts.push(PageScript { kind, source });
        }

        page
    }
}

/// External scripts load only from the page's own blob store.
fn resolve_script_src(src: &str, store: &BlobStore) -> Result<String, String> {
    let same_origin = ObjectUrl::parse(src)
        .and_then(|url| url.origin())
        .zip(url::Url::parse(store.origin()).ok())
        .is_some_and(|(origin, page)| origin == page.origin().ascii_serialization());

    if !same_origin {
        return Err(format!(
            "Refused to load script '{}': only same-origin blob: URLs are allowed",
            src
        ));
    }

    store
        .resolve(src)
        .map(|blob| String::from_utf8_lossy(&blob.data).into_owned())
        .ok_or_else(|| format!("Failed to load script '{}': object URL has been revoked", src))
}

/// Create a fresh isolate for one page
pub fn create_page_runtime(config: &SandboxConfig, store: &BlobStore) -> Result<JsRuntime, Error> {
    let loader = BlobModuleLoader::new(store.clone())?;

    // Configure V8 heap limits if specified
    let create_params = config
        .max_heap_size
        .map(|max_bytes| v8::Isolate::create_params().heap_limits(0, max_bytes));

    let mut runtime = JsRuntime::new(RuntimeOptions {
        module_loader: Some(Rc::new(loader)),
        extensions: vec![playground_page::init_ops_and_esm()],
        create_params,
        ..Default::default()
    });

    if config.max_heap_size.is_some() {
        runtime.add_near_heap_limit_callback(|current, initial| {
            // Keep the limit so V8 raises OOM inside the page instead of growing
            tracing::warn!(
                current_mb = current / (1024 * 1024),
                initial_mb = initial / (1024 * 1024),
                "Hosted page near heap limit"
            );
            current
        });
    }

    {
        let op_state = runtime.op_state();
        let mut state = op_state.borrow_mut();
        state.put(ConsoleOutput::default());
        state.put(FetchConfig {
            allowed_origins: config.allowed_origins.clone(),
        });
        state.put(store.clone());
    }

    Ok(runtime)
}

struct Navigation {
    url: ObjectUrl,
    digest: String,
    generation: u64,
    reply: oneshot::Sender<LoadReport>,
}

type CurrentIsolate = Arc<Mutex<Option<v8::IsolateHandle>>>;

/// Handle to the host thread. Dropping it stops the host once the current page ends.
pub struct PreviewHost {
    tx: mpsc::UnboundedSender<Navigation>,
    generation: watch::Sender<u64>,
    current: CurrentIsolate,
    _thread: JoinHandle<()>,
}

impl PreviewHost {
    pub fn spawn(config: SandboxConfig, store: BlobStore) -> Result<Self, RenderError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (generation, generation_rx) = watch::channel(0u64);
        let current: CurrentIsolate = Arc::default();

        let thread_current = Arc::clone(&current);
        let thread = std::thread::Builder::new()
            .name("preview-host".into())
            .spawn(move || {
                // One worker for page watchdogs; pages themselves run on this thread
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .enable_all()
                    .build();
                match runtime {
                    Ok(runtime) => runtime.block_on(host_loop(
                        rx,
                        generation_rx,
                        thread_current,
                        config,
                        store,
                    )),
                    Err(e) => tracing::error!(error = %e, "Preview host failed to start"),
                }
            })
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to spawn preview host thread");
                RenderError::HostUnavailable
            })?;

        Ok(Self {
            tx,
            generation,
            current,
            _thread: thread,
        })
    }

    /// Point the host at `url`, replacing whatever page it is showing.
    pub fn navigate(
        &self,
        url: ObjectUrl,
        digest: String,
    ) -> Result<oneshot::Receiver<LoadReport>, RenderError> {
        let mut generation = 0;
        self.generation.send_modify(|g| {
            *g += 1;
            generation = *g;
        });

        if let Some(handle) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            handle.terminate_execution();
        }

        let (reply, loaded) = oneshot::channel();
        self.tx
            .send(Navigation {
                url,
                digest,
                generation,
                reply,
            })
            .map_err(|_| RenderError::HostUnavailable)?;
        Ok(loaded)
    }
}

async fn host_loop(
    mut rx: mpsc::UnboundedReceiver<Navigation>,
    mut generation: watch::Receiver<u64>,
    current: CurrentIsolate,
    config: SandboxConfig,
    store: BlobStore,
) {
    tracing::debug!("Preview host ready");

    while let Some(nav) = rx.recv().await {
        let latest = *generation.borrow_and_update();
        if nav.generation < latest {
            tracing::debug!(url = %nav.url, "Skipping superseded navigation");
            let _ = nav
                .reply
                .send(LoadReport::new(&nav.url, nav.digest, LoadStatus::Superseded));
            continue;
        }

        host_page(nav, &mut generation, &current, &config, &store).await;
    }

    tracing::debug!("Preview host shutting down");
}

/// Load one page, report, then let it run until its budget ends or it is replaced.
async fn host_page(
    nav: Navigation,
    generation: &mut watch::Receiver<u64>,
    current: &CurrentIsolate,
    config: &SandboxConfig,
    store: &BlobStore,
) {
    let Navigation {
        url, digest, reply, ..
    } = nav;
    let deadline = Instant::now() + config.page_budget;

    // Read the document once; the handle may be revoked any time after this
    let Some(blob) = store.resolve(url.as_str()) else {
        tracing::warn!(%url, "Object URL revoked before the page could load");
        let reason = format!("{} was revoked before load", url);
        let _ = reply.send(LoadReport::new(&url, digest, LoadStatus::Failed(reason)));
        return;
    };
    let html = String::from_utf8_lossy(&blob.data).into_owned();
    let page = PageDocument::parse(&html, store);

    let mut report = LoadReport::new(&url, digest, LoadStatus::Loaded);
    report.title = page.title.clone();
    report.scripts = page.scripts.len();

    let mut runtime = match create_page_runtime(config, store) {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!(%url, error = %e, "Failed to create page runtime");
            report.status = LoadStatus::Failed(e.to_string());
            let _ = reply.send(report);
            return;
        }
    };

    let isolate = runtime.v8_isolate().thread_safe_handle();
    *current.lock().unwrap_or_else(PoisonError::into_inner) = Some(isolate.clone());

    // Terminates synchronous runaway scripts; async waits are bounded by the deadline
    let watchdog = tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        isolate.terminate_execution();
    });

    let mut module_urls = Vec::new();
    let loaded = tokio::select! {
        result = tokio::time::timeout_at(
            deadline,
            load_page(&mut runtime, &url, &page, store, &mut module_urls),
        ) => match result {
            Ok(Ok(())) => LoadStatus::Loaded,
            Ok(Err(e)) => LoadStatus::Failed(describe_failure(&e, config)),
            Err(_) => LoadStatus::Failed(timed_out(config)),
        },
        _ = generation.changed() => LoadStatus::Failed("replaced by a newer run".into()),
    };

    report.console = console_snapshot(&mut runtime);
    report.console.errors.extend(page.blocked.iter().cloned());
    report.status = loaded;

    tracing::info!(
        %url,
        title = report.title.as_deref().unwrap_or(""),
        scripts = report.scripts,
        logs = report.console.logs.len(),
        errors = report.console.errors.len(),
        status = ?report.status,
        "Page loaded"
    );

    let keep_running = report.status == LoadStatus::Loaded;
    let seen = report.console.clone();
    let _ = reply.send(report);

    if keep_running {
        let outcome = tokio::select! {
            result = tokio::time::timeout_at(
                deadline,
                runtime.run_event_loop(PollEventLoopOptions::default()),
            ) => match result {
                Ok(Ok(())) => "idle",
                Ok(Err(e)) => {
                    tracing::debug!(%url, error = %e, "Page stopped with an error");
                    "error"
                }
                Err(_) => "budget",
            },
            _ = generation.changed() => "replaced",
        };
        log_late_console(&url, &seen, &console_snapshot(&mut runtime));
        tracing::debug!(%url, outcome, "Page closed");
    }

    watchdog.abort();
    *current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    for module_url in &module_urls {
        let _ = store.revoke(module_url);
    }
}

/// Run every script, then fire DOMContentLoaded and load.
///
/// A throwing script is reported as an uncaught error and loading carries
/// on with the next one, as a browser would.
async fn load_page(
    runtime: &mut JsRuntime,
    url: &ObjectUrl,
    page: &PageDocument,
    store: &BlobStore,
    module_urls: &mut Vec<ObjectUrl>,
) -> Result<(), Error> {
    let init = serde_json::json!({
        "url": url.as_str(),
        "origin": store.origin(),
        "title": page.title,
    });
    runtime.execute_script("<page-init>", format!("globalThis.__playground_init__({})", init))?;

    // Module scripts are deferred: they run after every classic script
    let classic = page.scripts.iter().filter(|s| s.kind == ScriptKind::Classic);
    let modules = page.scripts.iter().filter(|s| s.kind == ScriptKind::Module);

    for script in classic.chain(modules) {
        let result = match script.kind {
            ScriptKind::Classic => runtime
                .execute_script("<page-script>", script.source.clone())
                .map(|_| ()),
            ScriptKind::Module => run_module(runtime, store, &script.source, module_urls).await,
        };

        if let Err(e) = result {
            if is_termination(&e) {
                return Err(e);
            }
            record_uncaught(runtime, &e);
        }
    }

    runtime.execute_script(
        "<page-events>",
        "globalThis.__playground_dispatch__('DOMContentLoaded'); \
         globalThis.__playground_dispatch__('load');",
    )?;

    Ok(())
}

async fn run_module(
    runtime: &mut JsRuntime,
    store: &BlobStore,
    source: &str,
    module_urls: &mut Vec<ObjectUrl>,
) -> Result<(), Error> {
    let url = store
        .create_object_url(source.as_bytes().to_vec(), "text/javascript")
        .map_err(|e| anyhow!("Failed to publish module script: {}", e))?;
    let specifier = ModuleSpecifier::parse(url.as_str())
        .map_err(|e| anyhow!("Invalid module URL '{}': {}", url, e))?;
    module_urls.push(url);

    let id = runtime.load_side_es_module(&specifier).await?;
    let evaluation = Box::pin(runtime.mod_evaluate(id));
    runtime
        .with_event_loop_future(evaluation, PollEventLoopOptions::default())
        .await
}

fn record_uncaught(runtime: &mut JsRuntime, error: &Error) {
    let op_state = runtime.op_state();
    let mut state = op_state.borrow_mut();
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        let message = error.to_string();
        if message.starts_with("Uncaught") {
            output.errors.push(message);
        } else {
            output.errors.push(format!("Uncaught {}", message));
        }
    }
}

fn console_snapshot(runtime: &mut JsRuntime) -> ConsoleOutput {
    let op_state = runtime.op_state();
    let state = op_state.borrow();
    let output = state.try_borrow::<ConsoleOutput>().cloned().unwrap_or_default();
    output
}

fn log_late_console(url: &ObjectUrl, seen: &ConsoleOutput, now: &ConsoleOutput) {
    for log in now.logs.iter().skip(seen.logs.len()) {
        tracing::debug!(%url, "[LOG] {}", log);
    }
    for warn in now.warns.iter().skip(seen.warns.len()) {
        tracing::debug!(%url, "[WARN] {}", warn);
    }
    for err in now.errors.iter().skip(seen.errors.len()) {
        tracing::debug!(%url, "[ERROR] {}", err);
    }
}

// V8 termination can manifest as various errors
fn is_termination(error: &Error) -> bool {
    let err_str = error.to_string();
    err_str.contains("terminated") || err_str.contains("execution terminated")
}

fn describe_failure(error: &Error, config: &SandboxConfig) -> String {
    if is_termination(error) {
        timed_out(config)
    } else {
        error.to_string()
    }
}

fn timed_out(config: &SandboxConfig) -> String {
    format!("Page timed out after {}ms", config.page_budget.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::compose_document;
    use crate::buffers::SourceBuffers;
    use std::time::Duration;

    fn store() -> BlobStore {
        BlobStore::new("http://preview.localhost")
    }

    #[test]
    fn test_parse_scripts_in_order() {
        let html = r#"<title> Demo </title><script>a()</script>
            <script type="module">import x from "y";</script>
            <script type="application/json">{"skip": true}</script>
            <SCRIPT TYPE='text/javascript'>b()</SCRIPT>"#;
        let page = PageDocument::parse(html, &store());

        assert_eq!(page.title.as_deref(), Some("Demo"));
        let kinds: Vec<_> = page.scripts.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![ScriptKind::Classic, ScriptKind::Module, ScriptKind::Classic]
        );
        assert_eq!(page.scripts[2].source, "b()");
    }

    #[test]
    fn test_commented_out_scripts_are_skipped() {
        let doc = compose_document(&SourceBuffers::new(
            "<!-- <script>console.log('hidden')</script> --><p>x</p>\n<!--\n<title>Old</title>\n-->",
            "",
            "console.log('real')",
        ));
        let page = PageDocument::parse(doc.as_str(), &store());

        let sources: Vec<_> = page.scripts.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(sources, vec!["console.log('real')"]);
        assert_eq!(page.title.as_deref(), Some("Code Playground Result"));
    }

    #[test]
    fn test_comment_markers_inside_scripts_stay_code() {
        let page = PageDocument::parse("<script>const s = '<!--'; run(s);</script>", &store());
        assert_eq!(page.scripts.len(), 1);
        assert_eq!(page.scripts[0].source, "const s = '<!--'; run(s);");
    }

    #[test]
    fn test_external_scripts_are_same_origin_only() {
        let store = store();
        let own = store
            .create_object_url(b"own()".to_vec(), "text/javascript")
            .unwrap();
        let html = format!(
            r#"<script src="{}"></script><script src="https://cdn.example.com/x.js"></script>"#,
            own
        );
        let page = PageDocument::parse(&html, &store);

        assert_eq!(page.scripts.len(), 1);
        assert_eq!(page.scripts[0].source, "own()");
        assert_eq!(page.blocked.len(), 1);
        assert!(page.blocked[0].contains("cdn.example.com"));
    }

    fn publish(store: &BlobStore, buffers: &SourceBuffers) -> (ObjectUrl, String) {
        let doc = compose_document(buffers);
        let digest = doc.digest();
        (store.create_object_url(doc.into_bytes(), "text/html").unwrap(), digest)
    }

    fn test_config() -> SandboxConfig {
        SandboxConfig {
            page_budget: Duration::from_millis(300),
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_page_console_is_captured() {
        let store = store();
        let host = PreviewHost::spawn(test_config(), store.clone()).unwrap();
        let (url, digest) = publish(
            &store,
            &SourceBuffers::new(
                "<h1>Hi</h1>",
                "",
                "console.log('ready'); document.addEventListener('DOMContentLoaded', () => console.log('dom'));",
            ),
        );

        let report = host.navigate(url, digest.clone()).unwrap().await.unwrap();
        assert_eq!(report.status, LoadStatus::Loaded);
        assert_eq!(report.digest, digest);
        assert_eq!(report.title.as_deref(), Some("Code Playground Result"));
        assert_eq!(report.console.logs, vec!["ready", "dom"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_script_errors_stay_inside_the_page() {
        let store = store();
        let host = PreviewHost::spawn(test_config(), store.clone()).unwrap();
        let (url, digest) = publish(
            &store,
            &SourceBuffers::new(
                "<script>throw new Error('boom')</script>",
                "",
                "console.log('still running')",
            ),
        );

        let report = host.navigate(url, digest).unwrap().await.unwrap();
        assert_eq!(report.status, LoadStatus::Loaded);
        assert!(report.console.errors[0].contains("boom"));
        assert_eq!(report.console.logs, vec!["still running"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_module_scripts_run_after_classic_scripts() {
        let store = store();
        let host = PreviewHost::spawn(test_config(), store.clone()).unwrap();
        let (url, digest) = publish(
            &store,
            &SourceBuffers::new(
                "<script type=\"module\">console.log('module')</script>\
                 <script>console.log('classic')</script>",
                "",
                "document.addEventListener('DOMContentLoaded', () => console.log('dom'));",
            ),
        );

        let report = host.navigate(url, digest).unwrap().await.unwrap();
        assert_eq!(report.status, LoadStatus::Loaded);
        assert_eq!(report.console.logs, vec!["classic", "module", "dom"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_oversized_timer_delays_are_clamped() {
        let store = store();
        let host = PreviewHost::spawn(test_config(), store.clone()).unwrap();
        let (url, digest) = publish(
            &store,
            &SourceBuffers::new(
                "",
                "",
                "setTimeout(() => {}, 1e12); setInterval(() => {}, 2 ** 40); console.log('scheduled');",
            ),
        );

        let report = host.navigate(url, digest).unwrap().await.unwrap();
        assert_eq!(report.status, LoadStatus::Loaded);
        assert_eq!(report.console.logs, vec!["scheduled"]);
        assert!(report.console.errors.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_runaway_script_is_terminated() {
        let store = store();
        let host = PreviewHost::spawn(test_config(), store.clone()).unwrap();
        let (url, digest) = publish(&store, &SourceBuffers::new("", "", "while (true) {}"));

        let report = host.navigate(url, digest).unwrap().await.unwrap();
        assert!(matches!(report.status, LoadStatus::Failed(ref reason) if reason.contains("timed out")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_revoked_url_fails_cleanly() {
        let store = store();
        let host = PreviewHost::spawn(test_config(), store.clone()).unwrap();
        let (url, digest) = publish(&store, &SourceBuffers::default());
        store.revoke(&url).unwrap();

        let report = host.navigate(url, digest).unwrap().await.unwrap();
        assert!(matches!(report.status, LoadStatus::Failed(ref reason) if reason.contains("revoked")));
    }
}
