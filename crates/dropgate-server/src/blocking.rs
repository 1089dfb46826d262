// crates/dropgate-server/src/blocking.rs
// ============================================================================
// Module: Blocking Bridges
// Description: Helpers that run synchronous engine calls from async handlers.
// Purpose: Keep tokio worker threads usable while the engine blocks.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! The delivery engine and its backends are synchronous. Handlers enter the
//! engine through [`run_blocking`], and backends that wrap async clients
//! (S3, HTTP payments) drive their futures with [`block_on_with_runtime`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;

use tokio::runtime::Handle;
use tokio::runtime::Runtime;
use tokio::runtime::RuntimeFlavor;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs a synchronous closure, yielding the worker thread when possible.
pub fn run_blocking<T>(work: impl FnOnce() -> T) -> T {
    if let Ok(handle) = Handle::try_current()
        && matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread)
    {
        return tokio::task::block_in_place(work);
    }
    work()
}

/// Blocks on a future using a compatible runtime.
///
/// On a multi-thread runtime the current worker is yielded and the future
/// runs on the ambient handle. On any other runtime the future runs on a
/// fresh runtime in a helper thread. Outside a runtime `runtime` is used.
///
/// # Errors
///
/// Returns a message when the helper thread cannot deliver a result.
pub fn block_on_with_runtime<F, T>(runtime: &Runtime, future: F) -> Result<T, String>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    if let Ok(handle) = Handle::try_current() {
        if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) {
            return Ok(tokio::task::block_in_place(|| handle.block_on(future)));
        }
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        std::thread::spawn(move || {
            let result = Runtime::new()
                .map_err(|err| err.to_string())
                .map(|runtime| runtime.block_on(future));
            let _ = tx.send(result);
        });
        return rx.recv().unwrap_or_else(|_| Err("blocking helper thread failed".to_string()));
    }
    Ok(runtime.block_on(future))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
