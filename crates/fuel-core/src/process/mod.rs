//! Process Manager (§4.3): owns every live agent subprocess.
//!
//! Adapted from the Claude Code harness adapter's spawn/kill/is_running idiom, but
//! generalized to any configured agent command and restructured around a single `poll()`
//! call instead of a per-handle event stream, since the scheduling loop here is a tick, not
//! a subscriber. Output capture still reads stdout/stderr line by line in background tasks
//! (tokio's non-blocking I/O primitives), accumulating into bounded ring buffers that
//! `poll()` drains on reap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

const RING_BUFFER_CAP: usize = 64 * 1024;
const TRUNCATION_MARKER: &str = "\n[... output truncated ...]\n";

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn agent {agent}: {source}")]
    SpawnFailed {
        agent: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no such child {0}")]
    NoSuchChild(Uuid),
}

/// Append-only buffer that keeps only its last `cap` bytes, marking the drop point once.
#[derive(Debug, Default)]
struct RingBuffer {
    data: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl RingBuffer {
    fn new(cap: usize) -> Self {
        Self { data: Vec::new(), cap, truncated: false }
    }

    fn push_line(&mut self, line: &str) {
        self.data.extend_from_slice(line.as_bytes());
        self.data.push(b'\n');
        if self.data.len() > self.cap {
            let overflow = self.data.len() - self.cap;
            self.data.drain(0..overflow);
            self.truncated = true;
        }
    }

    fn render(&self) -> String {
        let body = String::from_utf8_lossy(&self.data).into_owned();
        if self.truncated {
            format!("{TRUNCATION_MARKER}{body}")
        } else {
            body
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChildHandle {
    pub child_id: Uuid,
    pub agent: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChildView {
    pub child_id: Uuid,
    pub agent: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CompletionRecord {
    pub child_id: Uuid,
    pub agent: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl CompletionRecord {
    /// Combined stdout+stderr, for the completion-pattern scan (§4.6, §6).
    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

struct ChildState {
    agent: String,
    child: Child,
    started_at: DateTime<Utc>,
    stdout_buf: Arc<Mutex<RingBuffer>>,
    stderr_buf: Arc<Mutex<RingBuffer>>,
}

/// Single-threaded cooperative supervisor over agent subprocesses. All state lives here;
/// the Consume Runner calls `poll()` once per tick and never reaches past this type into
/// raw `tokio::process` handles.
type OutputCallback = Arc<dyn Fn(Uuid, &str) + Send + Sync>;

pub struct ProcessManager {
    children: HashMap<Uuid, ChildState>,
    shutting_down: Arc<AtomicBool>,
    output_callback: Option<OutputCallback>,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessManager {
    pub fn new() -> Self {
        Self {
            children: HashMap::new(),
            shutting_down: Arc::new(AtomicBool::new(false)),
            output_callback: None,
        }
    }

    /// Per-line streaming hook (§4.3), used by the IPC snapshot command to tail a running
    /// child's stdout without waiting for it to exit.
    pub fn set_output_callback<F>(&mut self, cb: F)
    where
        F: Fn(Uuid, &str) + Send + Sync + 'static,
    {
        self.output_callback = Some(Arc::new(cb));
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn spawn(
        &mut self,
        agent: &str,
        command: &str,
        args: &[String],
        env: &[(String, String)],
        cwd: &std::path::Path,
        stdin_payload: &str,
    ) -> Result<ChildHandle, ProcessError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::SpawnFailed {
            agent: agent.to_owned(),
            source,
        })?;

        let pid = child.id().unwrap_or(0);
        let started_at = Utc::now();

        if let Some(mut stdin) = child.stdin.take() {
            let payload = stdin_payload.to_owned();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    warn!(error = %e, "failed to write prompt to agent stdin");
                }
            });
        }

        let stdout_buf = Arc::new(Mutex::new(RingBuffer::new(RING_BUFFER_CAP)));
        let stderr_buf = Arc::new(Mutex::new(RingBuffer::new(RING_BUFFER_CAP)));
        let child_id = Uuid::new_v4();

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, Arc::clone(&stdout_buf), child_id, self.output_callback.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, Arc::clone(&stderr_buf), child_id, None);
        }

        self.children.insert(
            child_id,
            ChildState {
                agent: agent.to_owned(),
                child,
                started_at,
                stdout_buf,
                stderr_buf,
            },
        );

        Ok(ChildHandle { child_id, agent: agent.to_owned(), pid, started_at })
    }

    /// Non-blocking: reaps every child that has exited since the last call, returning one
    /// `CompletionRecord` per reaped child in reap order (§4.3 ordering guarantee).
    pub async fn poll(&mut self) -> Vec<CompletionRecord> {
        let mut completions = Vec::new();
        let mut exited = Vec::new();

        for (child_id, state) in self.children.iter_mut() {
            match state.child.try_wait() {
                Ok(Some(status)) => exited.push((*child_id, status.code().unwrap_or(-1))),
                Ok(None) => {}
                Err(e) => {
                    warn!(child_id = %child_id, error = %e, "error polling child status");
                }
            }
        }

        for (child_id, exit_code) in exited {
            if let Some(state) = self.children.remove(&child_id) {
                let stdout = state.stdout_buf.lock().await.render();
                let stderr = state.stderr_buf.lock().await.render();
                completions.push(CompletionRecord {
                    child_id,
                    agent: state.agent,
                    exit_code,
                    stdout,
                    stderr,
                    started_at: state.started_at,
                    ended_at: Utc::now(),
                });
            }
        }

        completions
    }

    pub fn get_active_processes(&self) -> Vec<ChildView> {
        self.children
            .iter()
            .map(|(child_id, state)| ChildView {
                child_id: *child_id,
                agent: state.agent.clone(),
                pid: state.child.id().unwrap_or(0),
                started_at: state.started_at,
            })
            .collect()
    }

    pub fn get_agent_count(&self, agent: &str) -> usize {
        self.children.values().filter(|s| s.agent == agent).count()
    }

    #[cfg(unix)]
    pub fn signal(&self, child_id: Uuid, sig: libc::c_int) -> Result<(), ProcessError> {
        let state = self.children.get(&child_id).ok_or(ProcessError::NoSuchChild(child_id))?;
        let pid = state.child.id().unwrap_or(0);
        // SAFETY: pid is a live child we spawned; sig is caller-supplied (SIGTERM/SIGKILL).
        unsafe {
            libc::kill(pid as i32, sig);
        }
        Ok(())
    }

    /// Installs SIGINT/SIGTERM handlers that flip `shutting_down` only (§9: "set a boolean
    /// flag only; all real work happens on the next loop iteration").
    #[cfg(unix)]
    pub fn register_signal_handlers(&self) -> std::io::Result<()> {
        let flag = Arc::clone(&self.shutting_down);
        tokio::spawn(async move {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler");
                    return;
                }
            };
            let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "failed to install SIGINT handler");
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = sigterm.recv() => { flag.store(true, Ordering::SeqCst); }
                    _ = sigint.recv() => { flag.store(true, Ordering::SeqCst); }
                }
            }
        });
        Ok(())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Soft-terminates every live child, waits up to `grace_deadline`, then force-kills
    /// whatever remains (§4.11 drain, §5 cancellation).
    pub async fn shutdown(&mut self, grace_deadline: Duration) {
        #[cfg(unix)]
        for state in self.children.values() {
            let pid = state.child.id().unwrap_or(0);
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
        }

        let deadline = tokio::time::Instant::now() + grace_deadline;
        while tokio::time::Instant::now() < deadline && !self.children.is_empty() {
            let _ = self.poll().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let remaining: Vec<Uuid> = self.children.keys().copied().collect();
        for child_id in remaining {
            if let Some(mut state) = self.children.remove(&child_id) {
                debug!(child_id = %child_id, "force killing child past grace deadline");
                let _ = state.child.kill().await;
            }
        }
    }
}

fn spawn_reader<R>(reader: R, buf: Arc<Mutex<RingBuffer>>, child_id: Uuid, callback: Option<OutputCallback>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(cb) = &callback {
                        cb(child_id, &line);
                    }
                    buf.lock().await.push_line(&line);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "error reading child output");
                    break;
                }
            }
        }
    });
}
