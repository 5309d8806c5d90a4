use crate::model::{decode_envelope, DecodeError, SnapshotEnvelope, Variant};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Runs an external command and hands back its stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String]) -> Result<Vec<u8>, RunError>;
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("no command configured")]
    EmptyCommand,
    #[error("could not start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}{}", stderr_suffix(.stderr))]
    Exit {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Spawns the telemetry producer as a child process. No timeout is applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, argv: &[String]) -> Result<Vec<u8>, RunError> {
        let (program, args) = argv.split_first().ok_or(RunError::EmptyCommand)?;
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RunError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RunError::Exit {
                program: program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0}")]
    Process(#[from] RunError),
    #[error("{0}")]
    Decode(#[from] DecodeError),
}

/// One invocation of the telemetry command per call; never retries.
#[derive(Clone)]
pub struct Fetcher {
    variant: Variant,
    argv: Vec<String>,
    runner: Arc<dyn CommandRunner>,
}

impl Fetcher {
    pub fn new(variant: Variant, argv: Vec<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            variant,
            argv,
            runner,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub async fn fetch(&self) -> Result<SnapshotEnvelope, FetchError> {
        let stdout = self.runner.run(&self.argv).await?;
        debug!(bytes = stdout.len(), "telemetry command finished");
        Ok(decode_envelope(self.variant, &stdout)?)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    pub enum Step {
        Ready(Result<Vec<u8>, String>),
        Gated(oneshot::Receiver<Result<Vec<u8>, String>>),
    }

    /// Replays queued outputs in call order; once the queue is drained the
    /// fallback output is returned.
    pub struct ScriptedRunner {
        steps: Mutex<VecDeque<Step>>,
        fallback: Vec<u8>,
        calls: AtomicUsize,
    }

    impl ScriptedRunner {
        pub fn new(fallback: &str) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(VecDeque::new()),
                fallback: fallback.as_bytes().to_vec(),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn push_ok(&self, stdout: &str) {
            self.push(Step::Ready(Ok(stdout.as_bytes().to_vec())));
        }

        pub fn push_err(&self, message: &str) {
            self.push(Step::Ready(Err(message.to_string())));
        }

        pub fn push_gated(&self) -> oneshot::Sender<Result<Vec<u8>, String>> {
            let (tx, rx) = oneshot::channel();
            self.push(Step::Gated(rx));
            tx
        }

        fn push(&self, step: Step) {
            self.steps.lock().unwrap().push_back(step);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, argv: &[String]) -> Result<Vec<u8>, RunError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            let result = match step {
                None => Ok(self.fallback.clone()),
                Some(Step::Ready(result)) => result,
                Some(Step::Gated(rx)) => rx.await.unwrap_or_else(|_| Err("gate dropped".into())),
            };
            result.map_err(|message| RunError::Spawn {
                program: argv.first().cloned().unwrap_or_default(),
                source: std::io::Error::new(std::io::ErrorKind::Other, message),
            })
        }
    }
}
