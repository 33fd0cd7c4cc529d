//! Staged apply execution: render, cleanup, create, agent check.
//!
//! Each stage is internally parallel with a bounded worker pool and joins
//! completely before the next stage starts. Cancellation is cooperative:
//! checked between object operations, in-flight operations are allowed to
//! finish so the control plane is never left mid-object.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::catalog::CatalogSnapshot;
use crate::scenario::Plan;

use super::{
    AgentCheck, AgentHealth, AgentOutcome, AgentStatus, ApplyConfig, ApplyReport, ControlPlane,
    OpOutcome, PeeringRef, PeeringSpec,
};

/// One control-plane operation to execute in a stage.
enum ControlOp {
    Delete(PeeringRef),
    Upsert(PeeringSpec),
}

impl ControlOp {
    fn object_name(&self) -> String {
        match self {
            ControlOp::Delete(peering) => peering.name().to_string(),
            ControlOp::Upsert(spec) => spec.name(),
        }
    }
}

/// Run a compiled plan against the control plane.
///
/// - `dry_run`: render only, zero collaborator calls.
/// - `cleanup_all`: best-effort delete of every existing peering first;
///   failures are warnings and never block creation.
/// - Creation attempts every object and aggregates per-object results.
/// - `agent_check`: verify every touched server's agent against the plan
///   digest; failures are reported but never undo the apply.
pub async fn run_apply(
    plan: &Plan,
    catalog: &CatalogSnapshot,
    control_plane: Arc<dyn ControlPlane>,
    agent_health: Arc<dyn AgentHealth>,
    config: &ApplyConfig,
    cancel: CancellationToken,
) -> Result<ApplyReport> {
    let mut report = ApplyReport {
        rendered: plan.render(),
        ..Default::default()
    };

    if config.dry_run {
        tracing::info!("dry run, not contacting the control plane");
        for token in plan.render_tokens() {
            tracing::info!(request = %token, "would apply");
        }
        report.dry_run = true;
        return Ok(report);
    }

    // 1. Cleanup (optional). Not transactional with creation: a failure
    // here is reported but creation still proceeds.
    if config.cleanup_all {
        let deletes: Vec<ControlOp> = catalog
            .vpc_peerings
            .iter()
            .cloned()
            .map(|name| ControlOp::Delete(PeeringRef::Vpc(name)))
            .chain(
                catalog
                    .external_peerings
                    .iter()
                    .cloned()
                    .map(|name| ControlOp::Delete(PeeringRef::External(name))),
            )
            .collect();
        tracing::info!(count = deletes.len(), "cleaning up existing peerings");
        let (outcomes, interrupted) =
            run_control_stage(deletes, &control_plane, config.concurrency, &cancel).await?;
        for outcome in &outcomes {
            if let Some(error) = &outcome.error {
                tracing::warn!(object = %outcome.object, error = %error, "cleanup failed");
            }
        }
        report.deleted = outcomes;
        report.interrupted |= interrupted;
    }

    if report.interrupted {
        tracing::warn!("apply cancelled during cleanup, skipping creation");
        return Ok(report);
    }

    // 2. Create every object in the plan; attempt all, collect results.
    let upserts: Vec<ControlOp> = plan
        .vpc_peerings
        .iter()
        .cloned()
        .map(|p| ControlOp::Upsert(PeeringSpec::Vpc(p)))
        .chain(
            plan.external_peerings
                .iter()
                .cloned()
                .map(|p| ControlOp::Upsert(PeeringSpec::External(p))),
        )
        .collect();
    tracing::info!(count = upserts.len(), "applying peering plan");
    let (outcomes, interrupted) =
        run_control_stage(upserts, &control_plane, config.concurrency, &cancel).await?;
    for outcome in &outcomes {
        if let Some(error) = &outcome.error {
            tracing::warn!(object = %outcome.object, error = %error, "create failed");
        }
    }
    report.created = outcomes;
    report.interrupted |= interrupted;

    if report.interrupted {
        tracing::warn!("apply cancelled during creation, skipping agent checks");
        return Ok(report);
    }

    // 3. Agent legitimacy checks (optional).
    if config.agent_check {
        let servers = plan.servers_touched(catalog);
        let expected = plan.digest();
        tracing::info!(count = servers.len(), "checking agents on touched servers");
        report.agents =
            run_agent_stage(servers, &agent_health, &expected, config, &cancel).await;
        for check in &report.agents {
            match &check.outcome {
                AgentOutcome::Legit => {}
                outcome => {
                    tracing::warn!(server = %check.server, ?outcome, "agent check failed");
                }
            }
        }
        report.interrupted |= report
            .agents
            .iter()
            .any(|a| a.outcome == AgentOutcome::Skipped);
    }

    Ok(report)
}

/// Execute a batch of control-plane operations with a bounded worker pool.
///
/// Workers are spawned up to the semaphore limit and joined through an mpsc
/// channel. Cancellation stops new spawns; already-spawned operations run
/// to completion and their outcomes are still collected.
async fn run_control_stage(
    ops: Vec<ControlOp>,
    control_plane: &Arc<dyn ControlPlane>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<(Vec<OpOutcome>, bool)> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let (tx, mut rx) = mpsc::channel::<OpOutcome>(ops.len().max(1));
    let mut in_flight = 0usize;
    let mut interrupted = false;

    for op in ops {
        if cancel.is_cancelled() {
            interrupted = true;
            break;
        }

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("worker pool semaphore closed")?;
        let control_plane = Arc::clone(control_plane);
        let tx = tx.clone();
        in_flight += 1;

        tokio::spawn(async move {
            let object = op.object_name();
            let result = match &op {
                ControlOp::Delete(peering) => control_plane.delete(peering).await,
                ControlOp::Upsert(spec) => control_plane.upsert(spec).await,
            };
            drop(permit);
            let _ = tx
                .send(OpOutcome {
                    object,
                    error: result.err().map(|e| format!("{e:#}")),
                })
                .await;
        });
    }
    drop(tx);

    let mut outcomes = Vec::with_capacity(in_flight);
    while in_flight > 0 {
        match rx.recv().await {
            Some(outcome) => {
                outcomes.push(outcome);
                in_flight -= 1;
            }
            None => break,
        }
    }

    // Completion order is nondeterministic; report in object order.
    outcomes.sort_by(|a, b| a.object.cmp(&b.object));
    Ok((outcomes, interrupted))
}

/// Health-check every touched server with bounded concurrency.
async fn run_agent_stage(
    servers: Vec<String>,
    agent_health: &Arc<dyn AgentHealth>,
    expected_digest: &str,
    config: &ApplyConfig,
    cancel: &CancellationToken,
) -> Vec<AgentCheck> {
    let checks = servers.into_iter().map(|server| {
        let agent_health = Arc::clone(agent_health);
        let expected = expected_digest.to_string();
        let cancel = cancel.clone();
        let timeout = config.agent_timeout;
        async move {
            if cancel.is_cancelled() {
                return AgentCheck {
                    server,
                    outcome: AgentOutcome::Skipped,
                };
            }
            let outcome = match tokio::time::timeout(
                timeout,
                agent_health.check(&server, &expected),
            )
            .await
            {
                Err(_) => AgentOutcome::TimedOut,
                Ok(Err(e)) => AgentOutcome::Error(format!("{e:#}")),
                Ok(Ok(AgentStatus::Legit)) => AgentOutcome::Legit,
                Ok(Ok(AgentStatus::DigestMismatch { reported })) => {
                    AgentOutcome::DigestMismatch { reported }
                }
                Ok(Ok(AgentStatus::Unreachable)) => AgentOutcome::Unreachable,
            };
            AgentCheck { server, outcome }
        }
    });

    let mut results: Vec<AgentCheck> = futures::stream::iter(checks)
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;
    results.sort_by(|a, b| a.server.cmp(&b.server));
    results
}
