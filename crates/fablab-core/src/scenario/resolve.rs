//! Semantic resolver: binds symbolic references against a catalog snapshot.
//!
//! Resolution applies the "exactly one" default-inference rules: a remote
//! peering without an explicit switch group binds the sole switch group, an
//! external peering without an explicit external binds the sole external in
//! the VPC's IPv4 namespace. Resolution never mutates the catalog and is
//! independent across requests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogSnapshot, canonical_vpc_name};

use super::parse::{ExternalPeeringRequest, RequestKind, VpcPeeringRequest};
use super::prefix::CompiledFilter;

/// Errors from resolving one request against the catalog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown VPC {0:?}")]
    UnknownVpc(String),

    #[error("VPC {0:?} cannot peer with itself")]
    SelfPeering(String),

    #[error("remote peering requested but no switch group exists")]
    NoSwitchGroup,

    #[error("remote peering requested but multiple switch groups exist ({}), name one explicitly", .0.join(", "))]
    AmbiguousSwitchGroup(Vec<String>),

    #[error("unknown switch group {0:?}")]
    UnknownSwitchGroup(String),

    #[error("unknown external {0:?}")]
    UnknownExternal(String),

    #[error("no external exists in IPv4 namespace {namespace:?} of VPC {vpc:?}")]
    NoExternal { vpc: String, namespace: String },

    #[error("multiple externals exist in IPv4 namespace {namespace:?} ({}), name one explicitly", .candidates.join(", "))]
    AmbiguousExternal {
        namespace: String,
        candidates: Vec<String>,
    },

    #[error("VPC {vpc:?} has no subnet {subnet:?}")]
    UnknownSubnet { vpc: String, subnet: String },
}

/// A fully resolved VPC-to-VPC peering. Endpoints are stored in sorted
/// order so the unordered pair has one representation; `group` is `Some`
/// exactly when `remote` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVpcPeering {
    pub vpc_a: String,
    pub vpc_b: String,
    pub remote: bool,
    pub group: Option<String>,
}

/// A fully resolved VPC-to-external peering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedExternalPeering {
    pub vpc: String,
    pub external: String,
    /// Exposed VPC subnets; never empty.
    pub subnets: Vec<String>,
    /// Route filters; never empty.
    pub filters: Vec<CompiledFilter>,
}

/// A resolved request of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Vpc(ResolvedVpcPeering),
    External(ResolvedExternalPeering),
}

/// Resolve one parsed request against the catalog snapshot.
pub fn resolve_request(
    kind: &RequestKind,
    catalog: &CatalogSnapshot,
) -> Result<Resolved, ResolveError> {
    match kind {
        RequestKind::Vpc(req) => resolve_vpc_peering(req, catalog).map(Resolved::Vpc),
        RequestKind::External(req) => {
            resolve_external_peering(req, catalog).map(Resolved::External)
        }
    }
}

fn resolve_vpc_peering(
    req: &VpcPeeringRequest,
    catalog: &CatalogSnapshot,
) -> Result<ResolvedVpcPeering, ResolveError> {
    let vpc_a = lookup_vpc(&req.vpc_a, catalog)?;
    let vpc_b = lookup_vpc(&req.vpc_b, catalog)?;
    if vpc_a == vpc_b {
        return Err(ResolveError::SelfPeering(vpc_a));
    }

    let group = if let Some(group) = &req.group {
        if !catalog.has_switch_group(group) {
            return Err(ResolveError::UnknownSwitchGroup(group.clone()));
        }
        Some(group.clone())
    } else if req.remote {
        match catalog.switch_groups.as_slice() {
            [] => return Err(ResolveError::NoSwitchGroup),
            [only] => Some(only.clone()),
            many => return Err(ResolveError::AmbiguousSwitchGroup(many.to_vec())),
        }
    } else {
        None
    };

    let (vpc_a, vpc_b) = if vpc_a <= vpc_b {
        (vpc_a, vpc_b)
    } else {
        (vpc_b, vpc_a)
    };

    Ok(ResolvedVpcPeering {
        vpc_a,
        vpc_b,
        remote: req.remote,
        group,
    })
}

fn resolve_external_peering(
    req: &ExternalPeeringRequest,
    catalog: &CatalogSnapshot,
) -> Result<ResolvedExternalPeering, ResolveError> {
    let vpc_name = lookup_vpc(&req.vpc, catalog)?;
    // lookup_vpc just confirmed existence
    let vpc = catalog
        .vpc(&vpc_name)
        .ok_or_else(|| ResolveError::UnknownVpc(vpc_name.clone()))?;

    let external = if let Some(name) = &req.external {
        catalog
            .external(name)
            .ok_or_else(|| ResolveError::UnknownExternal(name.clone()))?
            .name
            .clone()
    } else {
        let candidates = catalog.externals_in_namespace(&vpc.ipv4_namespace);
        match candidates.as_slice() {
            [] => {
                return Err(ResolveError::NoExternal {
                    vpc: vpc_name,
                    namespace: vpc.ipv4_namespace.clone(),
                });
            }
            [only] => only.name.clone(),
            many => {
                return Err(ResolveError::AmbiguousExternal {
                    namespace: vpc.ipv4_namespace.clone(),
                    candidates: many.iter().map(|e| e.name.clone()).collect(),
                });
            }
        }
    };

    let subnets = match &req.subnets {
        Some(subnets) => {
            for subnet in subnets {
                if !vpc.subnets.iter().any(|s| s == subnet) {
                    return Err(ResolveError::UnknownSubnet {
                        vpc: vpc_name,
                        subnet: subnet.clone(),
                    });
                }
            }
            subnets.clone()
        }
        None => vec!["default".to_string()],
    };

    let filters = match &req.prefixes {
        Some(tokens) => tokens.iter().map(CompiledFilter::from_token).collect(),
        None => vec![CompiledFilter::permit_any()],
    };

    Ok(ResolvedExternalPeering {
        vpc: vpc_name,
        external,
        subnets,
        filters,
    })
}

fn lookup_vpc(reference: &str, catalog: &CatalogSnapshot) -> Result<String, ResolveError> {
    let name = canonical_vpc_name(reference);
    if catalog.vpc(&name).is_none() {
        return Err(ResolveError::UnknownVpc(name));
    }
    Ok(name)
}
