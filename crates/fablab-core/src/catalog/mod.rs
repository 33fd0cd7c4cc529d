//! Catalog snapshot: the lab's live resource inventory.
//!
//! The snapshot is fetched once per invocation and treated as immutable for
//! the duration of compilation. Resolution never reaches around it to query
//! the fabric directly, which keeps the resolver unit-testable with a
//! fabricated catalog.

use serde::{Deserialize, Serialize};

/// A VPC known to the fabric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcInfo {
    /// Catalog name, e.g. `vpc-1`.
    pub name: String,
    /// Subnet names belonging to this VPC. Every VPC has a `default` subnet.
    pub subnets: Vec<String>,
    /// IPv4 namespace (addressing domain) this VPC belongs to.
    pub ipv4_namespace: String,
}

/// A named upstream/peer network boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalInfo {
    pub name: String,
    pub ipv4_namespace: String,
}

/// A lab server and the VPC its connection is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub vpc: String,
}

/// Immutable snapshot of fabric resources, taken once per invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub vpcs: Vec<VpcInfo>,
    pub switch_groups: Vec<String>,
    pub externals: Vec<ExternalInfo>,
    #[serde(default)]
    pub servers: Vec<ServerInfo>,
    /// Names of VPC-peering objects that currently exist in the fabric.
    #[serde(default)]
    pub vpc_peerings: Vec<String>,
    /// Names of external-peering objects that currently exist in the fabric.
    #[serde(default)]
    pub external_peerings: Vec<String>,
}

impl CatalogSnapshot {
    /// Look up a VPC by its catalog name.
    pub fn vpc(&self, name: &str) -> Option<&VpcInfo> {
        self.vpcs.iter().find(|v| v.name == name)
    }

    /// Whether a switch group with this name exists.
    pub fn has_switch_group(&self, name: &str) -> bool {
        self.switch_groups.iter().any(|g| g == name)
    }

    /// Look up an external by name.
    pub fn external(&self, name: &str) -> Option<&ExternalInfo> {
        self.externals.iter().find(|e| e.name == name)
    }

    /// All externals whose IPv4 namespace matches `namespace`.
    pub fn externals_in_namespace(&self, namespace: &str) -> Vec<&ExternalInfo> {
        self.externals
            .iter()
            .filter(|e| e.ipv4_namespace == namespace)
            .collect()
    }

    /// Servers attached to any of the given VPCs, sorted and deduplicated.
    pub fn servers_in_vpcs(&self, vpcs: &[&str]) -> Vec<String> {
        let mut names: Vec<String> = self
            .servers
            .iter()
            .filter(|s| vpcs.contains(&s.vpc.as_str()))
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Canonicalize an operator-supplied VPC reference.
///
/// The grammar accepts the bare numeric shorthand used in the catalog's
/// `vpc-<n>` naming scheme, so `1` refers to `vpc-1`. Anything non-numeric
/// is taken as a full catalog name.
pub fn canonical_vpc_name(reference: &str) -> String {
    if !reference.is_empty() && reference.chars().all(|c| c.is_ascii_digit()) {
        format!("vpc-{reference}")
    } else {
        reference.to_string()
    }
}
