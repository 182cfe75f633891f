//! Task command handlers
//!
//! Handles all task-related CLI commands: decoding UPIDs, showing status,
//! waiting for completion, and reading or stopping tasks.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use proxima_client::retry::Operation;
use proxima_client::{ApiClient, CallContext, ClientError, TaskStatusSource, WaitOptions};
use proxima_core::dto::task::DEFAULT_LOG_LIMIT;
use proxima_core::{TaskLogLine, TaskStatus, Upid};

use crate::config::Config;

/// Task subcommands
#[derive(Subcommand)]
pub enum TaskCommands {
    /// Decode a UPID without contacting the cluster
    Parse {
        /// Task UPID
        upid: String,
    },
    /// Show the current status of a task
    Status {
        /// Task UPID
        upid: String,
    },
    /// Wait for a task to finish
    Wait {
        /// Task UPID
        upid: String,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 1800)]
        timeout: u64,

        /// Seconds between status fetches
        #[arg(long, default_value_t = 5)]
        poll_interval: u64,

        /// Accept "WARNINGS: n" exit statuses without errors
        #[arg(long)]
        ignore_warnings: bool,

        /// Keep polling when a status fetch fails with this HTTP status
        #[arg(long, value_name = "STATUS")]
        tolerate_status: Vec<u16>,
    },
    /// Show the first lines of a task log
    Log {
        /// Task UPID
        upid: String,

        /// Number of lines to fetch
        #[arg(short = 'n', long, default_value_t = DEFAULT_LOG_LIMIT)]
        limit: u32,
    },
    /// Stop a running task
    Stop {
        /// Task UPID
        upid: String,
    },
}

/// Handle task commands
///
/// Routes task subcommands to their respective handlers.
pub async fn handle_task_command(command: TaskCommands, config: &Config) -> Result<()> {
    if let TaskCommands::Parse { upid } = &command {
        return parse_task(upid);
    }

    let client = config.client()?;
    let ctx = cancel_on_ctrl_c();

    match command {
        TaskCommands::Parse { .. } => Ok(()),
        TaskCommands::Status { upid } => show_status(&client, &ctx, &upid).await,
        TaskCommands::Wait {
            upid,
            timeout,
            poll_interval,
            ignore_warnings,
            tolerate_status,
        } => {
            let options = wait_options(ignore_warnings, tolerate_status);
            let timeout = Duration::from_secs(timeout);
            let poll_interval = Duration::from_secs(poll_interval);
            wait_task(&client, &ctx, &upid, timeout, poll_interval, &options).await
        }
        TaskCommands::Log { upid, limit } => show_log(&client, &ctx, &upid, limit).await,
        TaskCommands::Stop { upid } => stop_task(&client, &ctx, &upid).await,
    }
}

/// Context cancelled on the first Ctrl-C
fn cancel_on_ctrl_c() -> CallContext {
    let ctx = CallContext::new();
    let token = ctx.token().clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received");
            token.cancel();
        }
    });

    ctx
}

fn wait_options(ignore_warnings: bool, tolerated: Vec<u16>) -> WaitOptions {
    let options = if ignore_warnings {
        WaitOptions::new().ignore_warnings()
    } else {
        WaitOptions::new()
    };

    tolerated.into_iter().fold(options, WaitOptions::tolerate_status)
}

/// Decode and display a UPID
fn parse_task(upid: &str) -> Result<()> {
    let parsed: Upid = upid.parse().context("not a valid UPID")?;

    println!("{}", "Task:".bold());
    println!("  Node:      {}", parsed.node.cyan());
    println!("  Type:      {}", parsed.kind);
    println!(
        "  Target:    {}",
        if parsed.target_id.is_empty() {
            "-".dimmed()
        } else {
            parsed.target_id.normal()
        }
    );
    println!("  User:      {}", parsed.principal);
    println!(
        "  Started:   {}",
        parsed.start_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  PID:       {}", parsed.pid.to_string().dimmed());
    println!("  PStart:    {}", parsed.pstart.to_string().dimmed());

    Ok(())
}

/// Fetch and display the current status of a task
async fn show_status(client: &ApiClient, ctx: &CallContext, upid: &str) -> Result<()> {
    let status = Operation::api_call("fetch task status")
        .run(ctx, || client.fetch_task_status(upid))
        .await?;

    println!("{}", "Task Status:".bold());
    println!("  UPID:        {}", upid.cyan());
    println!("  Status:      {}", colorize_status(&status));
    if let Some(node) = &status.node {
        println!("  Node:        {}", node);
    }
    if let Some(kind) = &status.kind {
        println!("  Type:        {}", kind);
    }
    if let Some(user) = &status.user {
        println!("  User:        {}", user);
    }
    if let Some(pid) = status.pid {
        println!("  PID:         {}", pid.to_string().dimmed());
    }

    Ok(())
}

/// Wait for a task, showing its log when it fails
async fn wait_task(
    client: &ApiClient,
    ctx: &CallContext,
    upid: &str,
    timeout: Duration,
    poll_interval: Duration,
    options: &WaitOptions,
) -> Result<()> {
    println!("{} {}", "Waiting for task".bold(), upid.cyan());
    let start = Instant::now();

    match client
        .wait_for_task(ctx, upid, timeout, poll_interval, options)
        .await
    {
        Ok(()) => {
            println!(
                "{} Task finished after {}s",
                "✓".green(),
                start.elapsed().as_secs()
            );
            Ok(())
        }
        Err(err @ ClientError::TaskFailed { .. }) => {
            println!("{} {}", "✗".red(), err.to_string().red());
            // Best effort: the failure matters more than a missing log
            if let Ok(lines) = client.task_log(upid, DEFAULT_LOG_LIMIT).await {
                print_log(upid, &lines);
            }
            Err(err.into())
        }
        Err(err) if err.is_interrupted() => {
            println!(
                "{}",
                "Stopped waiting; the task keeps running on the cluster.".yellow()
            );
            Err(err.into())
        }
        Err(err) => Err(err).with_context(|| format!("failed to wait for task {}", upid)),
    }
}

/// Fetch and display the first lines of a task log
async fn show_log(client: &ApiClient, ctx: &CallContext, upid: &str, limit: u32) -> Result<()> {
    let lines = Operation::api_call("fetch task log")
        .run(ctx, || client.task_log(upid, limit))
        .await?;

    if lines.is_empty() {
        println!("{}", "No log lines found for this task.".yellow());
    } else {
        print_log(upid, &lines);
    }

    Ok(())
}

async fn stop_task(client: &ApiClient, ctx: &CallContext, upid: &str) -> Result<()> {
    Operation::api_call("stop task")
        .run(ctx, || client.delete_task(upid))
        .await?;

    println!("{} Stop requested for {}", "✓".green(), upid.cyan());
    Ok(())
}

fn print_log(upid: &str, lines: &[TaskLogLine]) {
    println!("{}", format!("Log for task {}:", upid).bold());
    println!("{}", "─".repeat(80).dimmed());
    for line in lines {
        println!(
            "{} {}",
            format!("{:>4}", line.line_number).dimmed(),
            line.text
        );
    }
    println!("{}", "─".repeat(80).dimmed());
}

/// Colorize task status for display
fn colorize_status(status: &TaskStatus) -> ColoredString {
    if status.is_running() {
        return status.status.yellow();
    }

    let text = format!("{} ({})", status.status, status.exit_status());
    if status.is_ok() {
        text.green()
    } else if status.has_only_warnings() {
        text.yellow()
    } else {
        text.red()
    }
}
