//! Consume Runner (§4.11): the single-threaded cooperative loop that ties every other
//! component together. Restructured from the spawn-as-capacity-frees-up orchestrator loop
//! this codebase otherwise uses into a strict fixed-order tick, since Fuel has no DAG
//! scheduler driving it -- a tick is the entire unit of work.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use fuel_db::queries::tasks;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::completion::{self, HandlingOutcome};
use crate::config::ConfigFile;
use crate::context::FuelContext;
use crate::health::HealthTracker;
use crate::ipc::{Command as IpcCommand, Response as IpcResponse};
use crate::lifecycle::LifecycleManager;
use crate::process::ProcessManager;
use crate::review::{self, ReviewOutcome};
use crate::spawner;

/// How often the loop wakes up in the absence of an IPC event (§4.11: "tick interval").
const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// How long `stop --graceful` waits for in-flight agents before force-killing them.
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// How many queued IPC commands a single tick services before moving on, so a burst of
/// IPC traffic cannot starve the scheduling work (§4.11 step 5: "one batch").
const IPC_BATCH_SIZE: usize = 16;

enum InFlight {
    Run { run_id: String, task_id: String },
    Review { review_id: String, task_id: String },
}

pub struct Runner {
    pool: SqlitePool,
    config: ConfigFile,
    ctx: FuelContext,
    process_manager: ProcessManager,
    health: HealthTracker,
    lifecycle: LifecycleManager,
    ipc_rx: mpsc::Receiver<IpcCommand>,
    instance_id: Uuid,
    started_at: chrono::DateTime<Utc>,
    in_flight: HashMap<Uuid, InFlight>,
    /// Grace period used on the next drain. A non-graceful `stop` zeroes this so the drain
    /// force-terminates in-flight children immediately instead of waiting on them (§4.8:
    /// "graceful drains in-flight children first" implies the alternative does not).
    shutdown_grace: Duration,
}

impl Runner {
    /// Binds the IPC listener and acquires the lifecycle lock (§4.9, §4.11 step 0). Fails
    /// with [`crate::lifecycle::LifecycleError::AlreadyRunning`] if another instance holds
    /// the lock and its PID file proves it is alive.
    pub async fn start(
        pool: SqlitePool,
        config: ConfigFile,
        ctx: FuelContext,
    ) -> anyhow::Result<Self> {
        let port = config.consume.resolved_port();
        let mut lifecycle = LifecycleManager::new(&ctx.pid_path, &ctx.lock_path);
        let pid_file = lifecycle.start(port)?;

        let (tx, rx) = mpsc::channel(64);
        let bound_addr = crate::ipc::serve(port, tx).await?;
        info!(addr = %bound_addr, instance_id = %pid_file.instance_id, "IPC server listening");

        let health = HealthTracker::new(config.consume.max_agent_attempts(), config.consume.cooldown_seconds());
        let process_manager = ProcessManager::new();
        #[cfg(unix)]
        process_manager.register_signal_handlers()?;

        Ok(Self {
            pool,
            config,
            ctx,
            process_manager,
            health,
            lifecycle,
            ipc_rx: rx,
            instance_id: pid_file.instance_id,
            started_at: pid_file.started_at,
            in_flight: HashMap::new(),
            shutdown_grace: DEFAULT_GRACE_PERIOD,
        })
    }

    /// Runs ticks until shutdown is requested (by SIGTERM/SIGINT or an IPC `stop`),
    /// then drains in-flight agents and releases the lifecycle lock (§4.11 steps 1-6).
    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            if self.process_manager.is_shutting_down() {
                break;
            }
            self.tick().await?;
            tokio::time::sleep(TICK_INTERVAL).await;
        }

        info!(grace = ?self.shutdown_grace, "draining in-flight agents before shutdown");
        self.process_manager.shutdown(self.shutdown_grace).await;
        self.lifecycle.cleanup();
        Ok(())
    }

    async fn tick(&mut self) -> anyhow::Result<()> {
        // 1. Reap finished subprocesses and route each to the Completion Handler or the
        //    Review Manager, depending on what spawned it.
        let completions = self.process_manager.poll().await;
        for completion in completions {
            match self.in_flight.remove(&completion.child_id) {
                Some(InFlight::Run { run_id, task_id }) => {
                    let review_enabled = !self.config.review.skip && self.config.review.agent.is_some();
                    let outcome =
                        completion::handle(&self.pool, &mut self.health, &run_id, &task_id, &completion, review_enabled)
                            .await?;
                    self.refresh_epic_for_task(&task_id).await;

                    if outcome == HandlingOutcome::TriggerReview {
                        self.trigger_review(&task_id).await?;
                    }
                }
                Some(InFlight::Review { review_id, task_id }) => {
                    let outcome = review::handle_completion(&self.pool, &review_id, &task_id, &completion).await?;
                    self.refresh_epic_for_task(&task_id).await;
                    if let ReviewOutcome::FailedWithIssues(issues) = &outcome {
                        warn!(task_id, issues = ?issues, "review failed, task returned to review queue");
                    }
                }
                None => {
                    warn!(child_id = %completion.child_id, "completion for untracked child, dropping");
                }
            }
        }

        // 2. Launch ready tasks while caps and health allow it.
        let ready = tasks::ready(&self.pool).await?;
        for task in ready {
            if self.process_manager.is_shutting_down() {
                break;
            }
            let complexity = task.complexity.to_string();
            let outcome = spawner::try_launch(
                &self.pool,
                &mut self.process_manager,
                &self.health,
                &self.config,
                &task.id,
                &task.title,
                task.description.as_deref(),
                &complexity,
                None,
                None,
                &self.ctx.root,
            )
            .await?;

            match outcome {
                spawner::LaunchOutcome::Spawned { run_id, child_id, agent } => {
                    self.health.record_spawn(&agent);
                    self.in_flight.insert(child_id, InFlight::Run { run_id, task_id: task.id.clone() });
                }
                spawner::LaunchOutcome::Rejected { reason } => {
                    if reason == "cooldown" || reason == "at_cap" {
                        // Expected backpressure; try again next tick.
                        continue;
                    }
                    warn!(task_id = %task.id, reason, "task not launched");
                }
            }
        }

        // 3. Service a bounded batch of IPC commands so polling traffic cannot starve
        //    scheduling work.
        for _ in 0..IPC_BATCH_SIZE {
            match self.ipc_rx.try_recv() {
                Ok(cmd) => self.dispatch_ipc(cmd).await,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => break,
            }
        }

        Ok(())
    }

    async fn trigger_review(&mut self, task_id: &str) -> anyhow::Result<()> {
        let Some(task) = tasks::get_task(&self.pool, task_id).await? else {
            return Ok(());
        };
        let spawned = review::trigger_review(
            &self.pool,
            &mut self.process_manager,
            &self.config,
            &task.id,
            &task.title,
            task.description.as_deref(),
            &self.ctx.root,
        )
        .await?;

        if let Some((review_id, child_id)) = spawned {
            self.in_flight.insert(child_id, InFlight::Review { review_id, task_id: task.id });
        } else {
            // No review agent configured: fall back to closing the task directly, the
            // same outcome as `review.skip = true` (§4.7: "absent configuration behaves
            // like skip").
            tasks::close_task(&self.pool, &task.id, Some("Auto-completed (no review agent configured)"), None, Utc::now())
                .await?;
        }
        Ok(())
    }

    async fn refresh_epic_for_task(&self, task_id: &str) {
        let Ok(Some(task)) = tasks::get_task(&self.pool, task_id).await else {
            return;
        };
        let Some(epic_id) = task.epic_id else {
            return;
        };
        if let Err(e) = crate::epic::refresh(&self.pool, &epic_id).await {
            warn!(epic_id, error = %e, "failed to refresh epic status");
        }
    }

    async fn dispatch_ipc(&mut self, cmd: IpcCommand) {
        let response = self.handle_ipc_request(&cmd.request).await;
        let _ = cmd.reply.send(response);
    }

    async fn handle_ipc_request(&mut self, request: &crate::ipc::Request) -> IpcResponse {
        match request.cmd.as_str() {
            "snapshot" => match self.build_snapshot().await {
                Ok(snapshot) => IpcResponse::ok(serde_json::to_value(snapshot).unwrap_or_default()),
                Err(e) => IpcResponse::err(e.to_string()),
            },
            "health" => IpcResponse::ok(serde_json::to_value(self.health.snapshot()).unwrap_or_default()),
            "stuck" => match tasks::stuck(&self.pool).await {
                Ok(stuck) => IpcResponse::ok(serde_json::to_value(stuck).unwrap_or_default()),
                Err(e) => IpcResponse::err(e.to_string()),
            },
            "stop" => {
                let graceful = request.args.get("graceful").and_then(|v| v.as_bool()).unwrap_or(true);
                info!(graceful, "stop requested over IPC");
                self.shutdown_grace = if graceful { DEFAULT_GRACE_PERIOD } else { Duration::ZERO };
                self.process_manager.request_shutdown();
                IpcResponse::ok(serde_json::json!({"stopping": true}))
            }
            cmd if cmd.starts_with("browser.") => {
                // Out of scope (§1): browser automation is acknowledged but not acted on.
                IpcResponse::err(format!("command {cmd:?} is not supported by this daemon"))
            }
            other => IpcResponse::err(format!("unknown command {other:?}")),
        }
    }

    async fn build_snapshot(&self) -> anyhow::Result<crate::snapshot::Snapshot> {
        crate::snapshot::build(&self.pool, &self.process_manager, &self.health.snapshot(), self.instance_id, self.started_at).await
    }
}

