//! Persistent session: one JSON request per line in, framed responses out.
//!
//! Request (one line):
//!   {"op":"edit","tab":"markup","text":"<p>hi</p>"}
//!
//! Response:
//!   Status:Ok
//!   Length:17
//!
//!   {"tab":"markup"}

use crate::buffers::{BufferStats, Tab};
use crate::compose::Composer;
use crate::controller::ExecutionController;
use crate::error::{PlaygroundError, SessionError};
use crate::settings::{LayoutMode, PreviewMode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::{BufRead, Write};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Request {
    /// Run and wait for the preview to settle.
    Run,
    Clear,
    Load {
        name: String,
    },
    Edit {
        tab: Tab,
        text: String,
    },
    #[serde(rename = "tab")]
    SelectTab {
        tab: Tab,
    },
    Format,
    /// Set the layout, or toggle it when `mode` is absent.
    Layout {
        #[serde(default)]
        mode: Option<LayoutMode>,
    },
    Preview {
        mode: PreviewMode,
    },
    State,
    Buffers,
    Stats {
        #[serde(default)]
        tab: Option<Tab>,
    },
    /// Return the document a run would hand off, without running.
    Compose,
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, SessionError> {
        serde_json::from_str(line).map_err(SessionError::InvalidRequest)
    }
}

#[derive(Serialize)]
struct AllStats {
    markup: BufferStats,
    style: BufferStats,
    script: BufferStats,
}

/// Drives one controller from framed requests.
pub struct Session {
    controller: ExecutionController,
    composer: Arc<dyn Composer>,
}

impl Session {
    pub fn new(controller: ExecutionController, composer: Arc<dyn Composer>) -> Self {
        Self {
            controller,
            composer,
        }
    }

    pub fn controller(&self) -> &ExecutionController {
        &self.controller
    }

    /// Apply one request and produce the response body.
    pub async fn handle(&self, request: Request) -> Result<String, PlaygroundError> {
        let ctl = &self.controller;
        let body = match request {
            Request::Run => {
                let outcome = ctl.run();
                ctl.wait_idle().await;
                json!({ "run": outcome, "report": ctl.last_report() })
            }
            Request::Clear => {
                ctl.clear();
                json!({ "cleared": true })
            }
            Request::Load { name } => {
                let example = ctl.load_example_by_name(&name)?;
                json!({ "loaded": example.name })
            }
            Request::Edit { tab, text } => {
                ctl.edit(tab, text);
                json!({ "tab": tab, "stats": ctl.stats(tab) })
            }
            Request::SelectTab { tab } => {
                ctl.set_active_tab(tab);
                json!({ "tab": tab })
            }
            Request::Format => json!(ctl.format()?),
            Request::Layout { mode } => {
                let layout = match mode {
                    Some(mode) => {
                        ctl.set_layout(mode);
                        mode
                    }
                    None => ctl.toggle_layout(),
                };
                json!({ "layout": layout })
            }
            Request::Preview { mode } => {
                ctl.set_preview_mode(mode);
                json!({ "preview": mode, "width": mode.surface_width() })
            }
            Request::State => json!({
                "state": ctl.state(),
                "tab": ctl.active_tab(),
                "layout": ctl.layout(),
                "preview": ctl.preview_mode(),
            }),
            Request::Buffers => json!(ctl.buffers()),
            Request::Stats { tab: Some(tab) } => json!(ctl.stats(tab)),
            Request::Stats { tab: None } => json!(AllStats {
                markup: ctl.stats(Tab::Markup),
                style: ctl.stats(Tab::Style),
                script: ctl.stats(Tab::Script),
            }),
            Request::Compose => {
                let document = self.composer.compose(&ctl.buffers())?;
                return Ok(document.into());
            }
        };

        serde_json::to_string(&body)
            .map_err(|e| SessionError::Encode(e).into())
    }

    /// Serve requests until `reader` hits EOF.
    pub async fn serve<R: BufRead, W: Write>(
        &self,
        mut reader: R,
        writer: &mut W,
    ) -> Result<(), SessionError> {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request = match Request::parse(trimmed) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(error = %e, "Rejected session request");
                    write_response(writer, false, &e.to_string())?;
                    continue;
                }
            };

            tracing::debug!(?request, "Session request");
            match self.handle(request).await {
                Ok(body) => write_response(writer, true, &body)?,
                Err(e) => write_response(writer, false, &e.to_string())?,
            }
        }
        Ok(())
    }
}

/// Write one response in the length-prefixed framing.
pub fn write_response<W: Write>(writer: &mut W, ok: bool, body: &str) -> Result<(), SessionError> {
    let status = if ok { "Ok" } else { "Error" };

    writeln!(writer, "Status:{}", status)?;
    writeln!(writer, "Length:{}", body.len())?;
    writeln!(writer)?;
    write!(writer, "{}", body)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::HtmlComposer;
    use crate::config::SandboxConfig;
    use crate::renderer::testing::RecordingRenderer;
    use crate::renderer::IsolatedRenderer;
    use crate::settings::Settings;
    use std::io::Cursor;

    /// Split framed output back into (ok, body) pairs.
    fn parse_responses(raw: &str) -> Vec<(bool, String)> {
        let mut out = Vec::new();
        let mut rest = raw;
        while !rest.is_empty() {
            let (status, tail) = rest.split_once('\n').unwrap();
            let (length, tail) = tail.split_once('\n').unwrap();
            let tail = tail.strip_prefix('\n').unwrap();
            let len: usize = length.strip_prefix("Length:").unwrap().parse().unwrap();
            out.push((status == "Status:Ok", tail[..len].to_string()));
            rest = &tail[len..];
        }
        out
    }

    fn session(renderer: &Arc<RecordingRenderer>) -> Session {
        let composer: Arc<dyn Composer> = Arc::new(HtmlComposer);
        let controller = ExecutionController::mount(
            Arc::clone(&composer),
            Arc::clone(renderer) as Arc<dyn IsolatedRenderer>,
            &Settings::default(),
            SandboxConfig::default(),
        )
        .unwrap();
        Session::new(controller, composer)
    }

    #[test]
    fn test_parse_requests() {
        assert_eq!(Request::parse(r#"{"op":"run"}"#).unwrap(), Request::Run);
        assert_eq!(
            Request::parse(r#"{"op":"tab","tab":"css"}"#).unwrap(),
            Request::SelectTab { tab: Tab::Style }
        );
        assert_eq!(
            Request::parse(r#"{"op":"layout"}"#).unwrap(),
            Request::Layout { mode: None }
        );
        assert!(Request::parse(r#"{"op":"explode"}"#).is_err());
        assert!(Request::parse("not json").is_err());
    }

    #[test]
    fn test_write_response_framing() {
        let mut out = Vec::new();
        write_response(&mut out, false, "boom").unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Status:Error\nLength:4\n\nboom");
    }

    #[tokio::test(start_paused = true)]
    async fn test_serve_edit_and_compose() {
        let renderer = Arc::new(RecordingRenderer::new());
        let session = session(&renderer);
        let input = concat!(
            "{\"op\":\"clear\"}\n",
            "\n",
            "{\"op\":\"edit\",\"tab\":\"markup\",\"text\":\"<p>hi</p>\"}\n",
            "{\"op\":\"compose\"}\n",
        );

        let mut out = Vec::new();
        session.serve(Cursor::new(input), &mut out).await.unwrap();
        let responses = parse_responses(&String::from_utf8(out).unwrap());

        assert_eq!(responses.len(), 3);
        assert!(responses.iter().all(|(ok, _)| *ok));
        assert!(responses[2].1.contains("<body>\n<p>hi</p>\n"));
        assert!(responses[2].1.contains("<script>// Add your JavaScript code here</script>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_serve_reports_errors_and_continues() {
        let renderer = Arc::new(RecordingRenderer::new());
        let session = session(&renderer);
        let input = "garbage\n{\"op\":\"load\",\"name\":\"missing\"}\n{\"op\":\"load\",\"name\":\"clock\"}\n";

        let mut out = Vec::new();
        session.serve(Cursor::new(input), &mut out).await.unwrap();
        let responses = parse_responses(&String::from_utf8(out).unwrap());

        assert_eq!(responses.len(), 3);
        assert!(!responses[0].0);
        assert!(responses[0].1.starts_with("invalid request"));
        assert!(!responses[1].0);
        assert!(responses[1].1.contains("Available"));
        assert_eq!(responses[2], (true, r#"{"loaded":"clock"}"#.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_waits_for_settle() {
        let mut recording = RecordingRenderer::new();
        recording.signal_load = true;
        let renderer = Arc::new(recording);
        let session = session(&renderer);
        session.controller().wait_idle().await;

        let body = session.handle(Request::Run).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(value["run"]["outcome"], "started");
        assert_eq!(value["report"]["status"], "loaded");
        assert_eq!(renderer.presented().len(), 2);
        assert!(renderer.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_and_layout() {
        let renderer = Arc::new(RecordingRenderer::new());
        let session = session(&renderer);

        let body = session.handle(Request::Layout { mode: None }).await.unwrap();
        assert_eq!(body, r#"{"layout":"vertical"}"#);

        session.handle(Request::SelectTab { tab: Tab::Script }).await.unwrap();
        let state: serde_json::Value =
            serde_json::from_str(&session.handle(Request::State).await.unwrap()).unwrap();
        assert_eq!(state["tab"], "script");
        assert_eq!(state["layout"], "vertical");
        assert_eq!(state["state"], "running");
    }
}
