//! `fuel consume`: start the daemon described in the Consume Runner, or forward `stop`/
//! `status` to an already-running one over its IPC socket.

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use fuel_core::config;
use fuel_core::consume::Runner;
use fuel_core::context::FuelContext;
use fuel_core::lifecycle;
use fuel_db::pool;

pub async fn run_start(ctx: &FuelContext, port_override: Option<u16>) -> Result<()> {
    if !ctx.fuel_dir.exists() {
        bail!(
            "no .fuel/ workspace found at {}; run `fuel init` first",
            ctx.root.display()
        );
    }

    let mut cfg = config::load(&ctx.config_path).context("failed to load config")?;
    if let Some(port) = port_override {
        cfg.consume.port = port;
    }

    let db_config = fuel_db::config::DbConfig::new(&ctx.db_path);
    let db_pool = pool::create_pool(&db_config).await?;
    pool::run_migrations(&db_pool, pool::default_migrations_path()).await?;

    let runner = Runner::start(db_pool, cfg, ctx.clone()).await?;
    runner.run().await
}

pub async fn run_stop(ctx: &FuelContext, graceful: bool) -> Result<()> {
    let port = resolve_port(ctx).context("fuel consume is not running")?;
    let response = send_request(port, "stop", serde_json::json!({ "graceful": graceful })).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub async fn run_status(ctx: &FuelContext) -> Result<()> {
    let Some(pid_file) = lifecycle::read_pid_file(&ctx.pid_path) else {
        println!("fuel consume is not running");
        return Ok(());
    };
    println!(
        "running: pid={} instance={} port={} started_at={}",
        pid_file.pid, pid_file.instance_id, pid_file.port, pid_file.started_at
    );

    let response = send_request(pid_file.port, "snapshot", serde_json::Value::Null).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn resolve_port(ctx: &FuelContext) -> Option<u16> {
    lifecycle::read_pid_file(&ctx.pid_path).map(|p| p.port)
}

async fn send_request(port: u16, cmd: &str, args: serde_json::Value) -> Result<serde_json::Value> {
    let stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to connect to fuel consume on port {port}"))?;
    let (read_half, mut write_half) = stream.into_split();

    let mut request = serde_json::to_vec(&serde_json::json!({ "cmd": cmd, "args": args }))?;
    request.push(b'\n');
    write_half.write_all(&request).await?;

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    serde_json::from_str(line.trim()).context("malformed response from daemon")
}
