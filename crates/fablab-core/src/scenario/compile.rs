//! Plan compiler: drives parse → resolve → aggregate over a whole scenario.
//!
//! All errors are collected in a single input-order pass and attributed to
//! the 1-based position and original text of the offending request; no
//! partial plan is produced when any error exists. Duplicate VPC-peering
//! requests are idempotent, contradictory ones conflict, and repeated
//! external-peering requests merge into one entry.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::catalog::CatalogSnapshot;

use super::parse::{self, ParseError};
use super::resolve::{
    Resolved, ResolvedExternalPeering, ResolvedVpcPeering, ResolveError, resolve_request,
};

/// A contradiction between requests in the same scenario.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error(
        "conflicting peering request for {vpc_a}+{vpc_b}: an earlier request \
         specified remote={earlier_remote} group={earlier_group:?}"
    )]
    ConflictingPeeringRequest {
        vpc_a: String,
        vpc_b: String,
        earlier_remote: bool,
        earlier_group: Option<String>,
    },
}

/// One failed request, attributed to its original input position.
#[derive(Debug, Error)]
#[error("request #{position} ({request:?}): {kind}")]
pub struct ScenarioError {
    /// 1-based position of the request in the scenario.
    pub position: usize,
    /// Original request text as the operator typed it.
    pub request: String,
    pub kind: ScenarioErrorKind,
}

/// The stage a request failed in.
#[derive(Debug, Error)]
pub enum ScenarioErrorKind {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Conflict(#[from] CompileError),
}

/// All failures from compiling a scenario, in input order.
#[derive(Debug)]
pub struct ScenarioErrors(pub Vec<ScenarioError>);

impl std::fmt::Display for ScenarioErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ScenarioErrors {}

/// The compiled, immutable apply plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Plan {
    pub vpc_peerings: Vec<ResolvedVpcPeering>,
    pub external_peerings: Vec<ResolvedExternalPeering>,
}

/// Compile a scenario: every request string, in order, against one catalog
/// snapshot. Returns the plan or every error found.
pub fn compile(requests: &[String], catalog: &CatalogSnapshot) -> Result<Plan, ScenarioErrors> {
    let mut errors: Vec<ScenarioError> = Vec::new();
    let mut vpc_peerings: Vec<ResolvedVpcPeering> = Vec::new();
    let mut external_peerings: Vec<ResolvedExternalPeering> = Vec::new();

    for (i, raw) in requests.iter().enumerate() {
        let position = i + 1;
        let fail = |kind: ScenarioErrorKind| ScenarioError {
            position,
            request: raw.clone(),
            kind,
        };

        let kind = match parse::parse_request(raw) {
            Ok(kind) => kind,
            Err(e) => {
                errors.push(fail(e.into()));
                continue;
            }
        };

        let resolved = match resolve_request(&kind, catalog) {
            Ok(resolved) => resolved,
            Err(e) => {
                errors.push(fail(e.into()));
                continue;
            }
        };

        match resolved {
            Resolved::Vpc(peering) => {
                match vpc_peerings
                    .iter()
                    .find(|p| p.vpc_a == peering.vpc_a && p.vpc_b == peering.vpc_b)
                {
                    None => vpc_peerings.push(peering),
                    Some(earlier)
                        if earlier.remote == peering.remote
                            && earlier.group == peering.group => {} // idempotent repeat
                    Some(earlier) => {
                        let conflict = CompileError::ConflictingPeeringRequest {
                            vpc_a: peering.vpc_a.clone(),
                            vpc_b: peering.vpc_b.clone(),
                            earlier_remote: earlier.remote,
                            earlier_group: earlier.group.clone(),
                        };
                        errors.push(fail(conflict.into()));
                    }
                }
            }
            Resolved::External(peering) => {
                match external_peerings
                    .iter_mut()
                    .find(|p| p.vpc == peering.vpc && p.external == peering.external)
                {
                    None => external_peerings.push(peering),
                    Some(existing) => merge_external(existing, peering),
                }
            }
        }
    }

    if !errors.is_empty() {
        return Err(ScenarioErrors(errors));
    }

    Ok(Plan {
        vpc_peerings,
        external_peerings,
    }
    .normalized())
}

/// Merge a repeated external-peering request into the existing entry:
/// union of subnets, concatenation of filters. Multiple clauses for the
/// same peering are a legitimate way to build a route policy incrementally.
fn merge_external(existing: &mut ResolvedExternalPeering, incoming: ResolvedExternalPeering) {
    for subnet in incoming.subnets {
        if !existing.subnets.contains(&subnet) {
            existing.subnets.push(subnet);
        }
    }
    existing.filters.extend(incoming.filters);
}

impl Plan {
    /// Sort entries, subnets and filters into the canonical stable order and
    /// drop filter repeats, so equal scenarios compile to equal plans
    /// regardless of request order.
    fn normalized(mut self) -> Self {
        self.vpc_peerings
            .sort_by(|a, b| (&a.vpc_a, &a.vpc_b).cmp(&(&b.vpc_a, &b.vpc_b)));
        self.external_peerings
            .sort_by(|a, b| (&a.vpc, &a.external).cmp(&(&b.vpc, &b.external)));
        for peering in &mut self.external_peerings {
            peering.subnets.sort();
            peering.subnets.dedup();
            peering
                .filters
                .sort_by_key(|f| (f.cidr, f.min_len, f.max_len));
            peering.filters.dedup();
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.vpc_peerings.is_empty() && self.external_peerings.is_empty()
    }

    /// Render each plan entry back to its canonical request token.
    /// Re-parsing the tokens against the same catalog yields an equal plan.
    pub fn render_tokens(&self) -> Vec<String> {
        let mut tokens = Vec::with_capacity(self.vpc_peerings.len() + self.external_peerings.len());
        for p in &self.vpc_peerings {
            let mut token = format!("{}+{}", p.vpc_a, p.vpc_b);
            if let Some(group) = &p.group {
                token.push_str(&format!(":r={group}"));
            }
            tokens.push(token);
        }
        for p in &self.external_peerings {
            let subnets = p.subnets.join(",");
            let prefixes: Vec<String> = p.filters.iter().map(|f| f.render()).collect();
            tokens.push(format!(
                "{}~{}:subnets={}:prefixes={}",
                p.vpc,
                p.external,
                subnets,
                prefixes.join(",")
            ));
        }
        tokens
    }

    /// Canonical textual form of the plan, one request per line.
    pub fn render(&self) -> String {
        self.render_tokens().join("\n")
    }

    /// Hex sha256 of the canonical rendering. Agents that converged on this
    /// plan report the same digest from their health endpoint.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.render().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Every VPC referenced by any plan entry, sorted and deduplicated.
    pub fn vpcs(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .vpc_peerings
            .iter()
            .flat_map(|p| [p.vpc_a.as_str(), p.vpc_b.as_str()])
            .chain(self.external_peerings.iter().map(|p| p.vpc.as_str()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Every server attached to a VPC touched by this plan.
    pub fn servers_touched(&self, catalog: &CatalogSnapshot) -> Vec<String> {
        catalog.servers_in_vpcs(&self.vpcs())
    }
}
