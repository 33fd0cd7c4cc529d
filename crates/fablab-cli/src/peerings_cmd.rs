//! Command bodies for `render` and `setup-peerings`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio_util::sync::CancellationToken;

use fablab_core::apply::{AgentOutcome, ApplyConfig, ApplyReport, run_apply};
use fablab_core::scenario::{self, Plan};
use fablab_core::statefile::{JsonStateControlPlane, LabState, StaticAgentHealth};

/// Flags for one `setup-peerings` run.
#[derive(Debug, Clone)]
pub struct SetupPeeringsArgs {
    pub requests: Vec<String>,
    pub dry_run: bool,
    pub cleanup: bool,
    pub agent_check: bool,
    pub concurrency: usize,
}

/// Compile a scenario against the lab state, failing with every offending
/// request listed by position.
fn compile_scenario(state: &LabState, requests: &[String]) -> Result<Plan> {
    match scenario::compile(requests, &state.snapshot()) {
        Ok(plan) => Ok(plan),
        Err(errors) => bail!("invalid scenario:\n{errors}"),
    }
}

/// Execute `fablab render`: compile and print the canonical plan.
pub fn run_render(state_path: &Path, requests: &[String]) -> Result<()> {
    let state = LabState::load(state_path)?;
    let plan = compile_scenario(&state, requests)?;

    for token in plan.render_tokens() {
        println!("{token}");
    }
    tracing::debug!(digest = %plan.digest(), "plan compiled");
    Ok(())
}

/// Execute `fablab setup-peerings`: compile, then apply best-effort.
///
/// Compilation errors are fatal. Apply-time per-object failures are
/// surfaced as warnings and do not fail the run.
pub async fn run_setup_peerings(state_path: &Path, args: SetupPeeringsArgs) -> Result<()> {
    let state = LabState::load(state_path)?;
    let snapshot = state.snapshot();
    let plan = compile_scenario(&state, &args.requests)?;

    let control_plane = Arc::new(JsonStateControlPlane::new(state_path.to_path_buf(), state.clone()));
    let agent_health = Arc::new(StaticAgentHealth::from_state(&state));

    let config = ApplyConfig {
        dry_run: args.dry_run,
        cleanup_all: args.cleanup,
        agent_check: args.agent_check,
        concurrency: args.concurrency,
        agent_timeout: Duration::from_secs(10),
    };

    // Ctrl-C requests cooperative cancellation; in-flight operations finish.
    let cancel = CancellationToken::new();
    let handler = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight operations");
            handler.cancel();
        }
    });

    let report = run_apply(&plan, &snapshot, control_plane, agent_health, &config, cancel).await?;
    print_report(&report, args.dry_run);
    Ok(())
}

fn print_report(report: &ApplyReport, dry_run: bool) {
    if dry_run {
        println!("dry run; would apply:");
        for line in report.rendered.lines() {
            println!("  {line}");
        }
        return;
    }

    let deleted_ok = report.deleted.iter().filter(|o| o.succeeded()).count();
    let created_ok = report.created.iter().filter(|o| o.succeeded()).count();
    println!(
        "applied: {created_ok}/{} created, {deleted_ok}/{} cleaned up",
        report.created.len(),
        report.deleted.len(),
    );

    for op in report.failed_ops() {
        let error = op.error.as_deref().unwrap_or("unknown error");
        tracing::warn!(object = %op.object, error = %error, "operation failed");
    }

    for check in &report.agents {
        match &check.outcome {
            AgentOutcome::Legit => {
                tracing::debug!(server = %check.server, "agent legit");
            }
            outcome => {
                tracing::warn!(server = %check.server, ?outcome, "agent check failed");
            }
        }
    }

    if report.interrupted {
        tracing::warn!("run was interrupted before completing all stages");
    } else if report.all_succeeded() {
        println!("all operations succeeded");
    } else {
        println!("one or more operations failed (see warnings)");
    }
}
