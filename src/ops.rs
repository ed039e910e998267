//! Ops available to hosted pages, and the extension that wires them up.
//!
//! A page gets console capture, timers, base64, crypto randomness and a
//! sandboxed fetch. Nothing touches the filesystem, the environment or the
//! host process.

use crate::fetch::op_fetch;
use anyhow::{anyhow, Error};
use deno_core::{op2, OpState};
use serde::Serialize;
use std::time::Duration;

// ============================================================================
// Console Output Capture
// ============================================================================

/// Captured console output from a hosted page
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleOutput {
    pub logs: Vec<String>,
    pub warns: Vec<String>,
    pub errors: Vec<String>,
}

impl ConsoleOutput {
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty() && self.warns.is_empty() && self.errors.is_empty()
    }
}

#[op2(fast)]
fn op_console_log(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.logs.push(msg.to_string());
    }
}

#[op2(fast)]
fn op_console_warn(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.warns.push(msg.to_string());
    }
}

#[op2(fast)]
fn op_console_error(state: &mut OpState, #[string] msg: &str) {
    if let Some(output) = state.try_borrow_mut::<ConsoleOutput>() {
        output.errors.push(msg.to_string());
    }
}

// ============================================================================
// Timers
// ============================================================================

/// Backs setTimeout/setInterval. Pending sleeps keep the event loop alive.
#[op2(async)]
async fn op_timer_sleep(millis: u32) {
    tokio::time::sleep(Duration::from_millis(u64::from(millis))).await;
}

// ============================================================================
// Crypto Ops
// ============================================================================

#[op2]
#[string]
fn op_crypto_random_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[op2(fast)]
fn op_crypto_get_random_values(#[buffer] buf: &mut [u8]) {
    use rand::RngCore;
    rand::thread_rng().fill_bytes(buf);
}

// ============================================================================
// Encoding Ops
// ============================================================================

#[op2]
#[string]
fn op_btoa(#[string] data: &str) -> Result<String, Error> {
    use base64::Engine;
    // btoa expects Latin-1, but we'll be lenient and accept UTF-8
    Ok(base64::engine::general_purpose::STANDARD.encode(data.as_bytes()))
}

#[op2]
#[string]
fn op_atob(#[string] data: &str) -> Result<String, Error> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| anyhow!("Invalid base64: {}", e))?;
    String::from_utf8(bytes).map_err(|e| anyhow!("Invalid UTF-8 in decoded data: {}", e))
}

// ============================================================================
// Extension Definition
// ============================================================================

deno_core::extension!(
    playground_page,
    ops = [
        op_console_log,
        op_console_warn,
        op_console_error,
        op_timer_sleep,
        op_crypto_random_uuid,
        op_crypto_get_random_values,
        op_btoa,
        op_atob,
        op_fetch,
    ],
    esm_entry_point = "ext:playground_page/bootstrap.js",
    esm = ["ext:playground_page/bootstrap.js" = "src/bootstrap.js"],
);
