//! JSON lab-state file: the lab's catalog plus its live peering objects.
//!
//! The fabric API's wire format is out of scope, so the shipped binary
//! drives the same `ControlPlane`/`AgentHealth` seams against a JSON state
//! file on disk. A real API client slots into the identical traits.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::apply::{AgentHealth, AgentStatus, ControlPlane, PeeringRef, PeeringSpec};
use crate::catalog::{CatalogSnapshot, ExternalInfo, ServerInfo, VpcInfo};

/// A peering object held in the lab state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringObject {
    pub kind: PeeringKind,
    pub spec: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeeringKind {
    Vpc,
    External,
}

/// On-disk lab state: resource definitions, live peering objects keyed by
/// name, and the config digest each server's agent last reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabState {
    pub vpcs: Vec<VpcInfo>,
    #[serde(default)]
    pub switch_groups: Vec<String>,
    #[serde(default)]
    pub externals: Vec<ExternalInfo>,
    #[serde(default)]
    pub servers: Vec<ServerInfo>,
    #[serde(default)]
    pub peerings: BTreeMap<String, PeeringObject>,
    #[serde(default)]
    pub agent_digests: BTreeMap<String, String>,
}

impl LabState {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read lab state at {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse lab state at {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create state directory {}", dir.display()))?;
        }
        let contents = serde_json::to_string_pretty(self).context("failed to serialize lab state")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write lab state at {}", path.display()))
    }

    /// Take the immutable catalog snapshot used for compilation.
    pub fn snapshot(&self) -> CatalogSnapshot {
        let names_of = |kind: PeeringKind| -> Vec<String> {
            self.peerings
                .iter()
                .filter(|(_, obj)| obj.kind == kind)
                .map(|(name, _)| name.clone())
                .collect()
        };
        CatalogSnapshot {
            vpcs: self.vpcs.clone(),
            switch_groups: self.switch_groups.clone(),
            externals: self.externals.clone(),
            servers: self.servers.clone(),
            vpc_peerings: names_of(PeeringKind::Vpc),
            external_peerings: names_of(PeeringKind::External),
        }
    }

    /// A small two-VPC lab, written by `fablab init` as a starting point.
    pub fn sample() -> Self {
        LabState {
            vpcs: (1..=2)
                .map(|i| VpcInfo {
                    name: format!("vpc-{i}"),
                    subnets: vec!["default".into()],
                    ipv4_namespace: "default".into(),
                })
                .collect(),
            switch_groups: vec!["border".into()],
            externals: vec![ExternalInfo {
                name: "as5835".into(),
                ipv4_namespace: "default".into(),
            }],
            servers: (1..=2)
                .map(|i| ServerInfo {
                    name: format!("server-0{i}"),
                    vpc: format!("vpc-{i}"),
                })
                .collect(),
            ..Default::default()
        }
    }
}

/// `ControlPlane` backed by the lab state file. Every mutation is persisted
/// immediately, so a crash mid-batch leaves only whole objects behind.
pub struct JsonStateControlPlane {
    path: PathBuf,
    state: Mutex<LabState>,
}

impl JsonStateControlPlane {
    pub fn new(path: PathBuf, state: LabState) -> Self {
        JsonStateControlPlane {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let state = LabState::load(path)?;
        Ok(Self::new(path.to_path_buf(), state))
    }
}

#[async_trait]
impl ControlPlane for JsonStateControlPlane {
    async fn delete(&self, peering: &PeeringRef) -> Result<()> {
        let mut state = self.state.lock().await;
        // Deleting an absent object is a no-op, per the collaborator contract.
        state.peerings.remove(peering.name());
        state.save(&self.path)
    }

    async fn upsert(&self, spec: &PeeringSpec) -> Result<()> {
        let mut state = self.state.lock().await;
        let kind = match spec {
            PeeringSpec::Vpc(_) => PeeringKind::Vpc,
            PeeringSpec::External(_) => PeeringKind::External,
        };
        let object = PeeringObject {
            kind,
            spec: serde_json::to_value(spec).context("failed to serialize peering spec")?,
        };
        state.peerings.insert(spec.name(), object);
        state.save(&self.path)
    }
}

/// `AgentHealth` that answers from the digests recorded in the lab state.
pub struct StaticAgentHealth {
    digests: BTreeMap<String, String>,
}

impl StaticAgentHealth {
    pub fn from_state(state: &LabState) -> Self {
        StaticAgentHealth {
            digests: state.agent_digests.clone(),
        }
    }
}

#[async_trait]
impl AgentHealth for StaticAgentHealth {
    async fn check(&self, server: &str, expected_digest: &str) -> Result<AgentStatus> {
        Ok(match self.digests.get(server) {
            None => AgentStatus::Unreachable,
            Some(reported) if reported == expected_digest => AgentStatus::Legit,
            Some(reported) => AgentStatus::DigestMismatch {
                reported: reported.clone(),
            },
        })
    }
}
