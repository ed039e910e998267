//! Execution controller - owns the buffers and the run/idle lifecycle.
//!
//! A run snapshots the buffers, composes them, hands the document to the
//! renderer and spawns a settle task. The settle task waits for the page to
//! load (or for the settle delay, whichever the config asks for), releases
//! the content handle and returns the controller to idle. Failures before
//! the handoff return to idle immediately.

use crate::buffers::{BufferStats, SourceBuffers, Tab};
use crate::compose::Composer;
use crate::config::{RunPolicy, SandboxConfig, SettleStrategy};
use crate::error::{ComposeError, FormatError, LibraryError, PlaygroundError, RenderError};
use crate::format::format_source;
use crate::host::LoadReport;
use crate::library::{self, Example};
use crate::renderer::{IsolatedRenderer, Presentation};
use crate::settings::{LayoutMode, PreviewMode, Settings};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Idle,
    Running,
}

/// What a call to `run()` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum RunOutcome {
    /// A document was handed to the renderer.
    Started { url: String, digest: String },
    /// Folded into the follow-up of the run currently settling.
    Coalesced,
    /// Nothing reached the preview; the controller is idle again.
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "tab", rename_all = "lowercase")]
pub enum FormatOutcome {
    Reformatted(Tab),
    Unchanged(Tab),
    /// The tab has no formatter.
    Unsupported(Tab),
}

#[derive(Debug, Clone)]
struct Workspace {
    buffers: SourceBuffers,
    active_tab: Tab,
    layout: LayoutMode,
    preview_mode: PreviewMode,
}

#[derive(Debug, Default)]
struct Flight {
    in_flight: usize,
    queued: bool,
}

struct Inner {
    composer: Arc<dyn Composer>,
    renderer: Arc<dyn IsolatedRenderer>,
    config: SandboxConfig,
    runtime: Handle,
    workspace: Mutex<Workspace>,
    flight: Mutex<Flight>,
    state: watch::Sender<ExecutionState>,
    last_report: Mutex<Option<LoadReport>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The playground's state machine. Clones share one controller.
#[derive(Clone)]
pub struct ExecutionController {
    inner: Arc<Inner>,
}

impl ExecutionController {
    /// Create the controller with the starter template and run it once.
    ///
    /// Must be called from inside a tokio runtime; settle tasks are spawned on it.
    pub fn mount(
        composer: Arc<dyn Composer>,
        renderer: Arc<dyn IsolatedRenderer>,
        settings: &Settings,
        config: SandboxConfig,
    ) -> Result<Self, PlaygroundError> {
        Self::mount_with_buffers(library::starter_template(), composer, renderer, settings, config)
    }

    /// Like [`mount`](Self::mount), starting from `buffers` instead of the starter template.
    pub fn mount_with_buffers(
        buffers: SourceBuffers,
        composer: Arc<dyn Composer>,
        renderer: Arc<dyn IsolatedRenderer>,
        settings: &Settings,
        config: SandboxConfig,
    ) -> Result<Self, PlaygroundError> {
        let runtime = Handle::try_current().map_err(|_| PlaygroundError::NoRuntime)?;
        let (state, _) = watch::channel(ExecutionState::Idle);

        let controller = Self {
            inner: Arc::new(Inner {
                composer,
                renderer,
                config,
                runtime,
                workspace: Mutex::new(Workspace {
                    buffers,
                    active_tab: Tab::default(),
                    layout: settings.layout_preference().unwrap_or_default(),
                    preview_mode: PreviewMode::default(),
                }),
                flight: Mutex::default(),
                state,
                last_report: Mutex::default(),
            }),
        };

        tracing::debug!(
            settle_delay_ms = controller.inner.config.settle_delay.as_millis() as u64,
            settle_strategy = ?controller.inner.config.settle_strategy,
            run_policy = ?controller.inner.config.run_policy,
            "Playground mounted"
        );
        controller.run();
        Ok(controller)
    }

    /// Compose the current buffers and show the result.
    pub fn run(&self) -> RunOutcome {
        {
            let mut flight = lock(&self.inner.flight);
            if self.inner.config.run_policy == RunPolicy::SingleFlight && flight.in_flight > 0 {
                flight.queued = true;
                tracing::debug!("Run requested while settling; queued one follow-up");
                return RunOutcome::Coalesced;
            }
            flight.in_flight += 1;
        }
        Inner::start(&self.inner)
    }

    /// Reset every buffer to the empty template. Does not run.
    pub fn clear(&self) {
        lock(&self.inner.workspace).buffers = library::reset_template();
        tracing::debug!("Buffers cleared");
    }

    /// Replace all three buffers with `example`. Does not run.
    pub fn load_example(&self, example: &Example) {
        lock(&self.inner.workspace).buffers = example.to_buffers();
        tracing::debug!(example = example.name, "Example loaded");
    }

    pub fn load_example_by_name(&self, name: &str) -> Result<&'static Example, LibraryError> {
        let example = library::find_example(name)?;
        self.load_example(example);
        Ok(example)
    }

    /// Reformat the active buffer. On error the buffer is left as it was.
    pub fn format(&self) -> Result<FormatOutcome, FormatError> {
        let mut workspace = lock(&self.inner.workspace);
        let tab = workspace.active_tab;

        match format_source(tab, workspace.buffers.get(tab)) {
            Ok(Some(formatted)) => {
                if formatted == workspace.buffers.get(tab) {
                    return Ok(FormatOutcome::Unchanged(tab));
                }
                workspace.buffers.set(tab, formatted);
                Ok(FormatOutcome::Reformatted(tab))
            }
            Ok(None) => Ok(FormatOutcome::Unsupported(tab)),
            Err(e) => {
                tracing::warn!(%tab, error = %e, "Format failed; buffer unchanged");
                Err(e)
            }
        }
    }

    /// Replace the text of one buffer.
    pub fn edit(&self, tab: Tab, text: impl Into<String>) {
        lock(&self.inner.workspace).buffers.set(tab, text);
    }

    /// Replace the text of the active buffer.
    pub fn edit_active(&self, text: impl Into<String>) {
        let mut workspace = lock(&self.inner.workspace);
        let tab = workspace.active_tab;
        workspace.buffers.set(tab, text);
    }

    pub fn set_active_tab(&self, tab: Tab) {
        lock(&self.inner.workspace).active_tab = tab;
    }

    pub fn active_tab(&self) -> Tab {
        lock(&self.inner.workspace).active_tab
    }

    pub fn buffer(&self, tab: Tab) -> String {
        lock(&self.inner.workspace).buffers.get(tab).to_string()
    }

    pub fn buffers(&self) -> SourceBuffers {
        lock(&self.inner.workspace).buffers.clone()
    }

    pub fn stats(&self, tab: Tab) -> BufferStats {
        BufferStats::of(lock(&self.inner.workspace).buffers.get(tab))
    }

    pub fn layout(&self) -> LayoutMode {
        lock(&self.inner.workspace).layout
    }

    pub fn set_layout(&self, layout: LayoutMode) {
        lock(&self.inner.workspace).layout = layout;
    }

    pub fn toggle_layout(&self) -> LayoutMode {
        let mut workspace = lock(&self.inner.workspace);
        workspace.layout = workspace.layout.toggled();
        workspace.layout
    }

    pub fn preview_mode(&self) -> PreviewMode {
        lock(&self.inner.workspace).preview_mode
    }

    pub fn set_preview_mode(&self, mode: PreviewMode) {
        lock(&self.inner.workspace).preview_mode = mode;
    }

    pub fn state(&self) -> ExecutionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.inner.state.subscribe()
    }

    /// Resolve once the controller is idle.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|state| *state == ExecutionState::Idle).await;
    }

    /// The load report of the most recently settled run, if the renderer sent one.
    pub fn last_report(&self) -> Option<LoadReport> {
        lock(&self.inner.last_report).clone()
    }
}

impl Inner {
    fn start(this: &Arc<Self>) -> RunOutcome {
        this.state.send_replace(ExecutionState::Running);
        let snapshot = lock(&this.workspace).buffers.clone();

        let composed = catch_unwind(AssertUnwindSafe(|| this.composer.compose(&snapshot)))
            .unwrap_or_else(|_| Err(ComposeError::Failed("composer panicked".into())));

        let document = match composed {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(error = %e, "Composition failed; preview not updated");
                return Self::abort(this, e.to_string());
            }
        };
        let digest = document.digest();

        let presented = catch_unwind(AssertUnwindSafe(|| this.renderer.present(document)))
            .unwrap_or_else(|_| Err(RenderError::HostUnavailable));

        let Presentation { handle, loaded } = match presented {
            Ok(presentation) => presentation,
            Err(e) => {
                tracing::warn!(error = %e, "Handoff to renderer failed; preview not updated");
                return Self::abort(this, e.to_string());
            }
        };

        tracing::info!(url = %handle, %digest, "Run started");
        let outcome = RunOutcome::Started {
            url: handle.to_string(),
            digest,
        };

        let inner = Arc::clone(this);
        this.runtime.spawn(async move {
            let report = inner.settle(loaded).await;
            if let Err(e) = inner.renderer.release(&handle) {
                tracing::warn!(url = %handle, error = %e, "Failed to release content handle");
            }
            if let Some(report) = report {
                *lock(&inner.last_report) = Some(report);
            }
            tracing::debug!(url = %handle, "Run settled");
            Self::finish(&inner);
        });

        outcome
    }

    fn abort(this: &Arc<Self>, reason: String) -> RunOutcome {
        Self::finish(this);
        RunOutcome::Failed { reason }
    }

    /// Wait until the handed-off page has settled.
    async fn settle(&self, loaded: Option<oneshot::Receiver<LoadReport>>) -> Option<LoadReport> {
        let delay = self.config.settle_delay;
        match (self.config.settle_strategy, loaded) {
            (SettleStrategy::LoadEvent, Some(loaded)) => {
                match tokio::time::timeout(delay, loaded).await {
                    Ok(Ok(report)) => Some(report),
                    Ok(Err(_)) => None,
                    Err(_) => {
                        tracing::debug!(
                            delay_ms = delay.as_millis() as u64,
                            "No load signal within the settle delay; releasing on timer"
                        );
                        None
                    }
                }
            }
            (_, loaded) => {
                tokio::time::sleep(delay).await;
                loaded.and_then(|mut loaded| loaded.try_recv().ok())
            }
        }
    }

    /// One run is over: go idle, or start the queued follow-up.
    fn finish(this: &Arc<Self>) {
        let follow_up = {
            let mut flight = lock(&this.flight);
            flight.in_flight = flight.in_flight.saturating_sub(1);
            let follow_up = flight.queued && flight.in_flight == 0;
            if follow_up {
                flight.queued = false;
                flight.in_flight += 1;
            }
            follow_up
        };

        if follow_up {
            tracing::debug!("Starting queued follow-up run");
            Self::start(this);
        } else {
            this.state.send_replace(ExecutionState::Idle);
        }
    }
}
