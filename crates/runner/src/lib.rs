//! Concurrent runner for the pipeline's long-lived processes.
//!
//! Every process receives a shared [`CancellationToken`]. The runner cancels
//! that token on SIGINT/SIGTERM, when an external token is cancelled, or as
//! soon as any process fails. Once every process has returned, the closers run
//! concurrently under a timeout.
//!
//! ```no_run
//! use std::time::Duration;
//! use weather_runner::Runner;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_named_process("ticker", |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => return Ok(()),
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => tracing::info!("tick"),
//!                 }
//!             }
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

/// Boxed future returned by processes and closers
pub type BoxedTask = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A long-running process. Receives the shared cancellation token.
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedTask + Send>;

/// Cleanup function executed after all processes have stopped
pub type Closer = Box<dyn FnOnce() -> BoxedTask + Send>;

struct NamedProcess {
    name: String,
    process: AppProcess,
}

pub struct Runner {
    processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Closer timeout defaults to 10 seconds; OS signals are handled.
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    /// Adds a process; its name is attached to the process span
    pub fn with_named_process<N, F, Fut>(mut self, name: N, process: F) -> Self
    where
        N: Into<String>,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.processes.push(NamedProcess {
            name: name.into(),
            process: Box::new(|token| Box::pin(process(token))),
        });
        self
    }

    /// Adds an already boxed process, as handed out by the workers
    pub fn with_boxed_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.processes.push(NamedProcess {
            name: name.into(),
            process,
        });
        self
    }

    /// Adds a closer. All closers run even if some of them fail.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned token so callers can stop the runner
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Disable SIGINT/SIGTERM handling
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Runs until stopped, then exits the process: code 1 when a process
    /// failed, code 0 otherwise.
    pub async fn run(self) {
        match self.run_until_stopped().await {
            Ok(()) => {
                info!("Application exiting normally");
                std::process::exit(0);
            }
            Err(err) => {
                error!("Application exiting with error: {:#}", err);
                std::process::exit(1);
            }
        }
    }

    /// Runs all processes until cancellation or the first failure, then the
    /// closers. Returns the first process error, if any.
    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for NamedProcess { name, process } in self.processes {
            let process_token = token.clone();
            let span = tracing::info_span!("app_process", process = %name);
            join_set.spawn(
                async move {
                    debug!("app process started");
                    let result = process(process_token).await;
                    (name, result)
                }
                .instrument(span),
            );
        }

        if self.handle_signals {
            spawn_signal_handlers(token.clone());
        }

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "app process completed");
                }
                Ok((name, Err(err))) => {
                    if first_error.is_none() {
                        error!(process = %name, "app process error: {:#}", err);
                        first_error = Some(err.context(format!("process '{}' failed", name)));
                    }
                    token.cancel();
                }
                Err(err) => {
                    error!("app process panicked: {}", err);
                    if first_error.is_none() {
                        first_error = Some(anyhow::anyhow!("app process panicked: {}", err));
                    }
                    token.cancel();
                }
            }
        }

        if !self.closers.is_empty() {
            info!("Running closers with timeout of {:?}", self.closer_timeout);
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => info!("All closers completed"),
                Err(_) => error!("Closers timed out after {:?}", self.closer_timeout),
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c_token.cancelled() => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    info!("Received shutdown signal");
                    ctrl_c_token.cancel();
                }
                Err(err) => error!("Error setting up signal handler: {}", err),
            },
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                error!("Error setting up SIGTERM handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = token.cancelled() => {}
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
                token.cancel();
            }
        }
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(closer());
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => debug!("Closer completed successfully"),
            Ok(Err(err)) => error!("Closer error: {:#}", err),
            Err(err) => error!("Closer panicked: {}", err),
        }
    }
}
