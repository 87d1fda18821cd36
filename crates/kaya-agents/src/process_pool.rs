//! Subprocess pool Runner and Gemini launch test/browser processes through.
//!
//! Bounded to `process_pool_size` concurrent subprocesses (default 5, fair
//! FIFO via `tokio::sync::Semaphore`) and built behind a `ProcessLauncher`
//! trait so tests can substitute a deterministic fake rather than shelling
//! out (spec.md §9). Grounded on the grounding repo's `tools::exec_tool`
//! `RunCommandTool` — same `spawn_blocking` + `tokio::time::timeout`
//! shape, generalized from a fixed allowlisted command to an arbitrary
//! program/args pair since Runner and Gemini invoke test binaries, not
//! shell one-liners.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("io error spawning process: {0}")]
    Io(#[from] std::io::Error),

    #[error("process timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("process pool join error: {0}")]
    Join(String),
}

pub type LaunchResult<T> = Result<T, LaunchError>;

/// One subprocess invocation.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

/// Swappable process-execution strategy. Production code shells out;
/// tests substitute a deterministic fake so Runner/Medic/Gemini's
/// orchestration logic can be exercised without real test binaries.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, request: LaunchRequest) -> LaunchResult<Output>;
}

/// Shells out via `std::process::Command`, off the async runtime, under a
/// timeout — the grounding repo's `exec_tool` pattern.
pub struct RealProcessLauncher;

#[async_trait]
impl ProcessLauncher for RealProcessLauncher {
    async fn launch(&self, request: LaunchRequest) -> LaunchResult<Output> {
        let LaunchRequest { program, args, working_dir, timeout } = request;
        let handle = tokio::task::spawn_blocking(move || {
            std::process::Command::new(&program)
                .args(&args)
                .current_dir(&working_dir)
                .output()
        });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(io_err))) => Err(LaunchError::Io(io_err)),
            Ok(Err(join_err)) => Err(LaunchError::Join(join_err.to_string())),
            Err(_) => Err(LaunchError::Timeout { seconds: timeout.as_secs() }),
        }
    }
}

/// Bounds concurrent subprocess launches to `capacity`, handing out permits
/// fairly (Tokio's semaphore wakes waiters in FIFO order).
pub struct ProcessPool {
    launcher: Arc<dyn ProcessLauncher>,
    semaphore: Arc<Semaphore>,
}

impl ProcessPool {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, capacity: usize) -> Self {
        Self {
            launcher,
            semaphore: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    /// Acquires a pool slot, runs `request` through the launcher, releases
    /// the slot on completion (success, error, or timeout alike).
    pub async fn run(&self, request: LaunchRequest) -> LaunchResult<Output> {
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");
        self.launcher.launch(request).await
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLauncher {
        concurrent: Arc<AtomicUsize>,
        max_seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProcessLauncher for CountingLauncher {
        async fn launch(&self, _request: LaunchRequest) -> LaunchResult<Output> {
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            Ok(Output {
                status: std::process::ExitStatus::from_raw(0),
                stdout: Vec::new(),
                stderr: Vec::new(),
            })
        }
    }

    fn request() -> LaunchRequest {
        LaunchRequest {
            program: "true".to_string(),
            args: vec![],
            working_dir: PathBuf::from("."),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn pool_bounds_concurrency_to_capacity() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let launcher = Arc::new(CountingLauncher {
            concurrent: concurrent.clone(),
            max_seen: max_seen.clone(),
        });
        let pool = Arc::new(ProcessPool::new(launcher, 2));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.run(request()).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn real_launcher_times_out_long_running_process() {
        let launcher = RealProcessLauncher;
        let result = launcher
            .launch(LaunchRequest {
                program: "sleep".to_string(),
                args: vec!["5".to_string()],
                working_dir: PathBuf::from("."),
                timeout: Duration::from_millis(50),
            })
            .await;
        assert!(matches!(result, Err(LaunchError::Timeout { .. })));
    }
}
