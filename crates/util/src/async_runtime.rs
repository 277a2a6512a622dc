//! Async runtime helpers for blocking callers.
//!
//! The engine is synchronous; process spawning goes through Tokio. This module provides
//! the single entry point for driving such futures from synchronous code paths,
//! reusing the current Tokio runtime when possible.

use std::{future::Future, io, thread};

use tokio::runtime::{Builder, Handle, RuntimeFlavor};

/// Execute an async future from synchronous code.
///
/// # Arguments
/// - `future`: The future to run to completion.
///
/// # Returns
/// Returns the future's output or an error if a Tokio runtime cannot be created.
///
/// # Notes
/// - Reuses the current runtime when it is multi-threaded.
/// - Inside a current-thread runtime the future runs on a scoped helper thread with its
///   own runtime, since blocking the only worker would deadlock.
/// - Falls back to a single-threaded runtime for call sites outside Tokio.
pub fn block_on_future<F, T>(future: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>> + Send,
    T: Send,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => tokio::task::block_in_place(|| handle.block_on(future)),
        Ok(_) => thread::scope(|scope| {
            scope
                .spawn(|| current_thread_block_on(future))
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("async helper thread panicked")))
        }),
        Err(_) => current_thread_block_on(future),
    }
}

fn current_thread_block_on<F, T>(future: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    Builder::new_current_thread().enable_all().build()?.block_on(future)
}
