//! The test-scenario peering language: parsing, resolution, compilation.

pub mod compile;
pub mod parse;
pub mod prefix;
pub mod resolve;

pub use compile::{CompileError, Plan, ScenarioError, ScenarioErrorKind, ScenarioErrors, compile};
pub use parse::{ExternalPeeringRequest, ParseError, RequestKind, VpcPeeringRequest, parse_request};
pub use prefix::{CompiledFilter, PrefixError, PrefixToken, parse_prefix_token};
pub use resolve::{
    Resolved, ResolvedExternalPeering, ResolvedVpcPeering, ResolveError, resolve_request,
};
