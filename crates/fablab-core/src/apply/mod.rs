//! Apply executor: pushes a compiled plan to the fabric control plane.
//!
//! Collaborators sit behind object-safe async traits so the executor is
//! testable with recording fakes. Execution is best-effort: every object is
//! attempted, per-object failures are collected rather than aborting the
//! batch, and nothing is rolled back.

mod executor;

pub use executor::run_apply;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::scenario::{ResolvedExternalPeering, ResolvedVpcPeering};

/// A reference to an existing peering object, as listed in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeeringRef {
    Vpc(String),
    External(String),
}

impl PeeringRef {
    pub fn name(&self) -> &str {
        match self {
            PeeringRef::Vpc(name) | PeeringRef::External(name) => name,
        }
    }
}

/// A declarative peering object to create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PeeringSpec {
    Vpc(ResolvedVpcPeering),
    External(ResolvedExternalPeering),
}

impl PeeringSpec {
    /// Object name in the fabric, e.g. `vpc-1--vpc-2` or `vpc-1--as5835`.
    pub fn name(&self) -> String {
        match self {
            PeeringSpec::Vpc(p) => format!("{}--{}", p.vpc_a, p.vpc_b),
            PeeringSpec::External(p) => format!("{}--{}", p.vpc, p.external),
        }
    }
}

/// The fabric control plane: the sole arbiter of peering-object state.
///
/// Deleting an object that does not exist is not an error; upsert is
/// create-or-update. Both are expected to be idempotent.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn delete(&self, peering: &PeeringRef) -> Result<()>;
    async fn upsert(&self, spec: &PeeringSpec) -> Result<()>;
}

/// What a server's configuration agent reported when asked for its health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    /// Responded with a config digest matching the desired state.
    Legit,
    /// Responded, but with a different config digest.
    DigestMismatch { reported: String },
    /// Did not respond at all.
    Unreachable,
}

/// Health/version endpoint of the per-server configuration agent.
#[async_trait]
pub trait AgentHealth: Send + Sync {
    /// Query one server's agent and compare its reported config digest
    /// against the desired-state digest.
    async fn check(&self, server: &str, expected_digest: &str) -> Result<AgentStatus>;
}

// Compile-time assertions: both collaborator traits must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn ControlPlane, _: &dyn AgentHealth) {}
};

/// Flags and limits for one apply run.
#[derive(Debug, Clone)]
pub struct ApplyConfig {
    /// Render the plan and return without contacting the control plane.
    pub dry_run: bool,
    /// Delete every existing peering object before applying.
    pub cleanup_all: bool,
    /// Health-check the configuration agent on every touched server.
    pub agent_check: bool,
    /// Worker-pool bound for control-plane operations and agent checks.
    pub concurrency: usize,
    /// Per-server timeout for agent health checks.
    pub agent_timeout: Duration,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        ApplyConfig {
            dry_run: false,
            cleanup_all: false,
            agent_check: true,
            concurrency: 8,
            agent_timeout: Duration::from_secs(10),
        }
    }
}

/// Outcome of one control-plane operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOutcome {
    pub object: String,
    /// `None` on success.
    pub error: Option<String>,
}

impl OpOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of one agent health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    Legit,
    DigestMismatch { reported: String },
    Unreachable,
    TimedOut,
    Error(String),
    /// Not attempted because the run was cancelled.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCheck {
    pub server: String,
    pub outcome: AgentOutcome,
}

/// Aggregate result of an apply run. Terminal states per stage:
/// dry-run stops after rendering; otherwise cleanup (optional), creation,
/// and agent checks (optional) each run to completion in strict order.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// Canonical rendering of the plan.
    pub rendered: String,
    /// True when the run stopped after rendering.
    pub dry_run: bool,
    pub deleted: Vec<OpOutcome>,
    pub created: Vec<OpOutcome>,
    pub agents: Vec<AgentCheck>,
    /// True when cancellation stopped the run before all stages finished.
    pub interrupted: bool,
}

impl ApplyReport {
    /// True when every attempted operation and agent check succeeded and
    /// the run was not interrupted.
    pub fn all_succeeded(&self) -> bool {
        !self.interrupted
            && self.deleted.iter().all(OpOutcome::succeeded)
            && self.created.iter().all(OpOutcome::succeeded)
            && self
                .agents
                .iter()
                .all(|a| matches!(a.outcome, AgentOutcome::Legit))
    }

    /// Failed control-plane operations, cleanup and creation combined.
    pub fn failed_ops(&self) -> Vec<&OpOutcome> {
        self.deleted
            .iter()
            .chain(self.created.iter())
            .filter(|o| !o.succeeded())
            .collect()
    }
}
