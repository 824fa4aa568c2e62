//! Deployment procedure executor

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::deploy::outcome::{DeploymentOutcome, DeploymentStatus};
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Runs the deployment procedure for an eligible event
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Whether the procedure is present and can be triggered
    async fn is_available(&self) -> bool;

    /// Location of the procedure, used in error messages
    fn procedure(&self) -> &Path;

    /// Run the procedure once and report the outcome
    async fn deploy(&self, delivery_id: &str) -> DeploymentOutcome;
}

/// Script executor options
#[derive(Debug, Clone)]
pub struct ScriptOptions {
    /// Path to the deployment script
    pub script: PathBuf,

    /// Program used to run the script. `None` executes the script directly.
    pub interpreter: Option<String>,

    /// Upper bound on a single run
    pub timeout: Duration,

    /// How long to keep reading output after the process has exited
    pub output_grace: Duration,

    /// Allow only one run at a time
    pub serialize: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            script: PathBuf::from("/opt/app/deploy.sh"),
            interpreter: Some("bash".to_string()),
            timeout: Duration::from_secs(600), // 10 minutes
            output_grace: Duration::from_secs(5),
            serialize: false,
        }
    }
}

/// Runs a script as a subprocess and writes one log file per run
pub struct ScriptDeployer {
    options: ScriptOptions,
    log_dir: Dir,
    slot: Option<tokio::sync::Mutex<()>>,
}

impl ScriptDeployer {
    /// Relative script paths are resolved against the current directory here,
    /// since the script later runs from its own parent directory.
    pub fn new(mut options: ScriptOptions, log_dir: Dir) -> Self {
        match std::path::absolute(&options.script) {
            Ok(script) => options.script = script,
            Err(e) => warn!(
                "Unable to resolve deployment script path {}: {}",
                options.script.display(),
                e
            ),
        }
        let slot = options.serialize.then(|| tokio::sync::Mutex::new(()));
        Self {
            options,
            log_dir,
            slot,
        }
    }

    fn command(&self) -> Command {
        let script = &self.options.script;
        let mut command = match &self.options.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(script);
                command
            }
            None => Command::new(script),
        };

        if let Some(parent) = script.parent().filter(|p| !p.as_os_str().is_empty()) {
            command.current_dir(parent);
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so a timeout can take down everything the script started
        #[cfg(unix)]
        command.process_group(0);

        command
    }

    async fn execute(&self) -> ProcessRun {
        let mut child = match self.command().spawn() {
            Ok(child) => child,
            Err(e) => {
                return ProcessRun {
                    result: RunResult::Failed(format!("failed to start deployment script: {}", e)),
                    stdout: String::new(),
                    stderr: String::new(),
                }
            }
        };

        let stdout = OutputCapture::start(child.stdout.take());
        let stderr = OutputCapture::start(child.stderr.take());

        let result = match tokio::time::timeout(self.options.timeout, child.wait()).await {
            Ok(Ok(status)) => RunResult::Exited(status),
            Ok(Err(e)) => RunResult::Failed(format!("failed to wait for deployment script: {}", e)),
            Err(_) => {
                warn!(
                    "Deployment script exceeded {:?}, terminating",
                    self.options.timeout
                );
                kill_process_group(&child);
                if let Err(e) = child.kill().await {
                    error!("Failed to terminate deployment script: {}", e);
                }
                RunResult::TimedOut
            }
        };

        let grace = self.options.output_grace;
        let (stdout, stderr) = tokio::join!(stdout.finish(grace), stderr.finish(grace));

        ProcessRun {
            result,
            stdout,
            stderr,
        }
    }

    fn summarize(&self, result: &RunResult) -> (DeploymentStatus, String, Option<i32>) {
        match result {
            RunResult::Exited(status) if status.success() => (
                DeploymentStatus::Success,
                "Deployment completed successfully".to_string(),
                status.code(),
            ),
            RunResult::Exited(status) => match status.code() {
                Some(code) => (
                    DeploymentStatus::Failed,
                    format!("Deployment failed with exit code {}", code),
                    Some(code),
                ),
                None => (
                    DeploymentStatus::Failed,
                    format!("Deployment terminated without an exit code ({})", status),
                    None,
                ),
            },
            RunResult::TimedOut => (
                DeploymentStatus::Timeout,
                format!(
                    "Deployment timed out after {}s",
                    self.options.timeout.as_secs()
                ),
                None,
            ),
            RunResult::Failed(e) => (
                DeploymentStatus::Error,
                format!("Deployment error: {}", e),
                None,
            ),
        }
    }
}

#[async_trait]
impl Deployer for ScriptDeployer {
    async fn is_available(&self) -> bool {
        File::new(&self.options.script).exists().await
    }

    fn procedure(&self) -> &Path {
        &self.options.script
    }

    async fn deploy(&self, delivery_id: &str) -> DeploymentOutcome {
        let _slot = match &self.slot {
            Some(slot) => Some(slot.lock().await),
            None => None,
        };

        let started_at = Local::now();
        let log_file = self.log_dir.file(&log_file_name(&started_at));
        info!(
            "Starting deployment {} with {} (log: {})",
            delivery_id,
            self.options.script.display(),
            log_file.path().display()
        );

        let header = format!(
            "=== Deployment started at {} ===\nscript: {}\ndelivery: {}\n",
            started_at.to_rfc3339(),
            self.options.script.display(),
            delivery_id,
        );
        append_log(&log_file, &header).await;

        let started = Instant::now();
        let run = self.execute().await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let (status, message, exit_code) = self.summarize(&run.result);

        let body = format!(
            "--- stdout ---\n{}\n--- stderr ---\n{}\n=== Deployment {}: {} (exit code: {}, duration: {} ms) ===\n",
            run.stdout,
            run.stderr,
            status,
            message,
            exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()),
            duration_ms,
        );
        append_log(&log_file, &body).await;

        if status.is_success() {
            info!("Deployment {} succeeded in {} ms", delivery_id, duration_ms);
            info!("Deployment stdout:\n{}", run.stdout);
            if !run.stderr.is_empty() {
                info!("Deployment stderr:\n{}", run.stderr);
            }
        } else {
            error!("Deployment {} {}: {}", delivery_id, status, message);
            error!("Deployment stdout:\n{}", run.stdout);
            error!("Deployment stderr:\n{}", run.stderr);
        }

        DeploymentOutcome {
            status,
            message,
            log_file: log_file.path().to_path_buf(),
            exit_code,
            duration_ms,
        }
    }
}

/// Per-invocation log file name, second granularity
pub fn log_file_name(started_at: &DateTime<Local>) -> String {
    format!("deploy_{}.log", started_at.format("%Y%m%d_%H%M%S"))
}

async fn append_log(log_file: &File, contents: &str) {
    if let Err(e) = log_file.append_string(contents).await {
        error!(
            "Failed to write deployment log {}: {}",
            log_file.path().display(),
            e
        );
    }
}

enum RunResult {
    Exited(ExitStatus),
    TimedOut,
    Failed(String),
}

struct ProcessRun {
    result: RunResult,
    stdout: String,
    stderr: String,
}

/// Drains a child output stream in the background.
///
/// Whatever was read is kept even if the stream never closes (a detached
/// grandchild can hold the pipe open past the child's exit).
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl OutputCapture {
    fn start<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();

        let task = tokio::spawn(async move {
            let Some(mut reader) = reader else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => lock(&sink).extend_from_slice(&chunk[..n]),
                }
            }
        });

        Self { buffer, task }
    }

    async fn finish(self, grace: Duration) -> String {
        let mut task = self.task;
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            warn!("Deployment output stream still open after {:?}, detaching", grace);
            task.abort();
        }
        let bytes = std::mem::take(&mut *lock(&self.buffer));
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            warn!("Failed to terminate deployment process group {}: {}", pid, e);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

fn lock(buffer: &Mutex<Vec<u8>>) -> std::sync::MutexGuard<'_, Vec<u8>> {
    match buffer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
