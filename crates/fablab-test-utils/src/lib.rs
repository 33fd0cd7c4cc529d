//! Shared test collaborators for fablab integration tests.
//!
//! Provides a catalog builder plus recording/scripted implementations of
//! the apply executor's collaborator traits, so tests can assert call
//! counts, inject per-object failures, and script agent responses.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;

use fablab_core::apply::{AgentHealth, AgentStatus, ControlPlane, PeeringRef, PeeringSpec};
use fablab_core::catalog::{CatalogSnapshot, ExternalInfo, ServerInfo, VpcInfo};

/// Fluent builder for fabricated catalog snapshots.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    snapshot: CatalogSnapshot,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a VPC with the given subnets in the given IPv4 namespace.
    /// The `default` subnet is always included.
    pub fn vpc(mut self, name: &str, extra_subnets: &[&str], namespace: &str) -> Self {
        let mut subnets = vec!["default".to_string()];
        subnets.extend(extra_subnets.iter().map(|s| s.to_string()));
        self.snapshot.vpcs.push(VpcInfo {
            name: name.to_string(),
            subnets,
            ipv4_namespace: namespace.to_string(),
        });
        self
    }

    pub fn switch_group(mut self, name: &str) -> Self {
        self.snapshot.switch_groups.push(name.to_string());
        self
    }

    pub fn external(mut self, name: &str, namespace: &str) -> Self {
        self.snapshot.externals.push(ExternalInfo {
            name: name.to_string(),
            ipv4_namespace: namespace.to_string(),
        });
        self
    }

    pub fn server(mut self, name: &str, vpc: &str) -> Self {
        self.snapshot.servers.push(ServerInfo {
            name: name.to_string(),
            vpc: vpc.to_string(),
        });
        self
    }

    /// Record a pre-existing VPC-peering object (cleanup target).
    pub fn existing_vpc_peering(mut self, name: &str) -> Self {
        self.snapshot.vpc_peerings.push(name.to_string());
        self
    }

    /// Record a pre-existing external-peering object (cleanup target).
    pub fn existing_external_peering(mut self, name: &str) -> Self {
        self.snapshot.external_peerings.push(name.to_string());
        self
    }

    pub fn build(self) -> CatalogSnapshot {
        self.snapshot
    }
}

/// `ControlPlane` fake that records every call and can fail named objects.
#[derive(Debug, Default)]
pub struct RecordingControlPlane {
    deletes: Mutex<Vec<String>>,
    upserts: Mutex<Vec<String>>,
    fail_objects: HashSet<String>,
}

impl RecordingControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation touching this object name will fail.
    pub fn fail_on(mut self, object: &str) -> Self {
        self.fail_objects.insert(object.to_string());
        self
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deletes.lock().expect("lock poisoned").clone()
    }

    pub fn upserted(&self) -> Vec<String> {
        self.upserts.lock().expect("lock poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.deleted().len() + self.upserted().len()
    }

    fn check_failure(&self, object: &str) -> Result<()> {
        if self.fail_objects.contains(object) {
            bail!("injected failure for {object}");
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for RecordingControlPlane {
    async fn delete(&self, peering: &PeeringRef) -> Result<()> {
        self.deletes
            .lock()
            .expect("lock poisoned")
            .push(peering.name().to_string());
        self.check_failure(peering.name())
    }

    async fn upsert(&self, spec: &PeeringSpec) -> Result<()> {
        let name = spec.name();
        self.upserts.lock().expect("lock poisoned").push(name.clone());
        self.check_failure(&name)
    }
}

/// `AgentHealth` fake answering from a scripted digest map, with an
/// optional per-check delay for timeout tests.
#[derive(Debug, Default)]
pub struct ScriptedAgentHealth {
    digests: HashMap<String, String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedAgentHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the digest this server's agent reports.
    pub fn with_agent(mut self, server: &str, digest: &str) -> Self {
        self.digests.insert(server.to_string(), digest.to_string());
        self
    }

    /// Delay every check by this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn checked(&self) -> Vec<String> {
        self.calls.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl AgentHealth for ScriptedAgentHealth {
    async fn check(&self, server: &str, expected_digest: &str) -> Result<AgentStatus> {
        self.calls
            .lock()
            .expect("lock poisoned")
            .push(server.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(match self.digests.get(server) {
            None => AgentStatus::Unreachable,
            Some(reported) if reported == expected_digest => AgentStatus::Legit,
            Some(reported) => AgentStatus::DigestMismatch {
                reported: reported.clone(),
            },
        })
    }
}
