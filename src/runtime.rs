//! Execution context for the tile fetch worker
//!
//! Fetches run on a dedicated Tokio runtime hosted by its own OS thread, so
//! the owning (UI) context never has to be async itself.

use crate::{MapError, Result};
use std::future::Future;
use std::thread::JoinHandle;
use std::time::Duration;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Thread hosting a Tokio runtime that drives one future to completion
#[derive(Debug)]
pub struct WorkerContext {
    name: String,
    thread: Option<JoinHandle<()>>,
}

impl WorkerContext {
    /// Start `future` on a new runtime with `threads` worker threads.
    ///
    /// One thread gives a current-thread runtime.
    pub fn spawn<F>(name: &str, threads: usize, future: F) -> Result<Self>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = if threads <= 1 {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .thread_name(name)
                .build()?
        } else {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(threads)
                .enable_all()
                .thread_name(name)
                .build()?
        };

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                runtime.block_on(future);
                runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
            })
            .map_err(|e| MapError::Worker(format!("failed to start {}: {}", name, e)))?;

        log::debug!("worker context '{}' started with {} thread(s)", name, threads.max(1));
        Ok(Self {
            name: name.to_string(),
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }
}

impl Drop for WorkerContext {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("worker context '{}' panicked", self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_runs_future_to_completion() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let context = WorkerContext::spawn("test-worker", 1, async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = tx.send(42);
        })
        .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 42);
        drop(context);
    }

    #[test]
    fn test_multi_thread_context() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let context = WorkerContext::spawn("test-pool", 2, async move {
            let mut handles = Vec::new();
            for i in 0..4 {
                let tx = tx.clone();
                handles.push(tokio::spawn(async move {
                    let _ = tx.send(i);
                }));
            }
            futures::future::join_all(handles).await;
        })
        .unwrap();

        let mut received: Vec<i32> = (0..4).filter_map(|_| rx.recv_timeout(Duration::from_secs(2)).ok()).collect();
        received.sort();
        assert_eq!(received, vec![0, 1, 2, 3]);
        assert_eq!(context.name(), "test-pool");
        drop(context);
    }
}
