//! Core library for the fablab virtual network-fabric test lab.
//!
//! The centerpiece is the test-scenario peering language: a compact grammar
//! that describes VPC-to-VPC and VPC-to-external peering relationships,
//! compiled against a catalog snapshot of the lab's live resources into a
//! declarative plan, then applied best-effort through the control-plane seam.

pub mod apply;
pub mod catalog;
pub mod scenario;
pub mod statefile;
