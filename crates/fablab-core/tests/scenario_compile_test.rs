//! End-to-end scenario compilation: operator request strings against a
//! fabricated catalog, checking the documented grammar and defaulting rules.

use fablab_core::scenario::{
    self, CompileError, Plan, ResolveError, ScenarioErrorKind, ScenarioErrors,
};
use fablab_test_utils::CatalogBuilder;

fn lab() -> fablab_core::catalog::CatalogSnapshot {
    CatalogBuilder::new()
        .vpc("vpc-1", &["sub1", "sub2"], "default")
        .vpc("vpc-2", &["sub1", "sub2"], "default")
        .vpc("vpc-4", &[], "default")
        .switch_group("border")
        .external("as5835", "default")
        .server("server-01", "vpc-1")
        .server("server-02", "vpc-2")
        .build()
}

fn compile(requests: &[&str]) -> Result<Plan, ScenarioErrors> {
    let requests: Vec<String> = requests.iter().map(|s| s.to_string()).collect();
    scenario::compile(&requests, &lab())
}

#[test]
fn local_peering_without_switch_groups() {
    let catalog = CatalogBuilder::new()
        .vpc("vpc-1", &[], "default")
        .vpc("vpc-2", &[], "default")
        .build();
    let plan = scenario::compile(&["1+2".to_string()], &catalog).unwrap();
    assert_eq!(plan.vpc_peerings.len(), 1);
    let p = &plan.vpc_peerings[0];
    assert_eq!((p.vpc_a.as_str(), p.vpc_b.as_str()), ("vpc-1", "vpc-2"));
    assert!(!p.remote);
    assert_eq!(p.group, None);
}

#[test]
fn remote_peering_with_named_group() {
    let plan = compile(&["2+4:r=border"]).unwrap();
    let p = &plan.vpc_peerings[0];
    assert!(p.remote);
    assert_eq!(p.group.as_deref(), Some("border"));
}

#[test]
fn remote_peering_with_unknown_group_fails() {
    let catalog = CatalogBuilder::new()
        .vpc("vpc-2", &[], "default")
        .vpc("vpc-4", &[], "default")
        .switch_group("leafs")
        .build();
    let errors = scenario::compile(&["2+4:r=border".to_string()], &catalog).unwrap_err();
    assert_eq!(errors.0.len(), 1);
    assert!(
        matches!(
            errors.0[0].kind,
            ScenarioErrorKind::Resolve(ResolveError::UnknownSwitchGroup(ref g)) if g == "border"
        ),
        "got: {}",
        errors.0[0]
    );
}

#[test]
fn explicit_external_with_defaults() {
    let plan = compile(&["1~as5835"]).unwrap();
    assert_eq!(plan.external_peerings.len(), 1);
    let p = &plan.external_peerings[0];
    assert_eq!(p.vpc, "vpc-1");
    assert_eq!(p.external, "as5835");
    assert_eq!(p.subnets, vec!["default"]);
    assert_eq!(p.filters.len(), 1);
    assert_eq!(p.filters[0].cidr.to_string(), "0.0.0.0/0");
    assert_eq!((p.filters[0].min_len, p.filters[0].max_len), (0, 32));
}

#[test]
fn implicit_external_requires_exactly_one_candidate() {
    let none = CatalogBuilder::new().vpc("vpc-1", &[], "default").build();
    let errors = scenario::compile(&["1~".to_string()], &none).unwrap_err();
    assert!(
        matches!(
            errors.0[0].kind,
            ScenarioErrorKind::Resolve(ResolveError::NoExternal { .. })
        ),
        "got: {}",
        errors.0[0]
    );

    let two = CatalogBuilder::new()
        .vpc("vpc-1", &[], "default")
        .external("as5835", "default")
        .external("as6500", "default")
        .build();
    let errors = scenario::compile(&["1~".to_string()], &two).unwrap_err();
    assert!(
        matches!(
            errors.0[0].kind,
            ScenarioErrorKind::Resolve(ResolveError::AmbiguousExternal { .. })
        ),
        "got: {}",
        errors.0[0]
    );
}

#[test]
fn prefix_qualifiers_compile_to_bounded_filters() {
    let plan = compile(&["1~as5835:ext_prefixes=0.0.0.0/0_le32_ge32,22.22.22.0/24"]).unwrap();
    let filters = &plan.external_peerings[0].filters;
    assert_eq!(filters.len(), 2);
    assert_eq!(filters[0].cidr.to_string(), "0.0.0.0/0");
    assert_eq!((filters[0].min_len, filters[0].max_len), (32, 32));
    assert_eq!(filters[1].cidr.to_string(), "22.22.22.0/24");
    assert_eq!((filters[1].min_len, filters[1].max_len), (24, 32));
}

#[test]
fn contradictory_vpc_requests_conflict() {
    let errors = compile(&["1+2", "1+2:r"]).unwrap_err();
    assert_eq!(errors.0.len(), 1);
    assert_eq!(errors.0[0].position, 2);
    assert_eq!(errors.0[0].request, "1+2:r");
    assert!(matches!(
        errors.0[0].kind,
        ScenarioErrorKind::Conflict(CompileError::ConflictingPeeringRequest { .. })
    ));
}

#[test]
fn request_order_does_not_change_the_plan() {
    let requests = ["1+2", "2+4:r=border", "1~as5835", "2~as5835:subnets=sub1"];
    let baseline = compile(&requests).unwrap();

    // A handful of permutations; the plan must be identical for all.
    let permutations: [[usize; 4]; 4] =
        [[3, 2, 1, 0], [1, 0, 3, 2], [2, 3, 0, 1], [3, 0, 2, 1]];
    for perm in permutations {
        let shuffled: Vec<&str> = perm.iter().map(|&i| requests[i]).collect();
        let plan = compile(&shuffled).unwrap();
        assert_eq!(plan, baseline, "order {perm:?} changed the plan");
    }
}

#[test]
fn rendered_plan_reparses_to_an_equal_plan() {
    let plan = compile(&[
        "2+4:r=border",
        "1+2",
        "1~as5835:vpc_subnets=sub1:ext_prefixes=10.0.0.0/8_le24,0.0.0.0/0_le32_ge32",
    ])
    .unwrap();
    let tokens = plan.render_tokens();
    let reparsed = scenario::compile(&tokens, &lab()).unwrap();
    assert_eq!(plan, reparsed);

    // And the canonical form is a fixed point: rendering again is identical.
    assert_eq!(plan.render(), reparsed.render());
}

#[test]
fn error_positions_are_one_based_input_order() {
    let errors = compile(&["nonsense", "1+2", "7+1"]).unwrap_err();
    let positions: Vec<usize> = errors.0.iter().map(|e| e.position).collect();
    assert_eq!(positions, vec![1, 3]);
    assert_eq!(errors.0[0].request, "nonsense");
    assert_eq!(errors.0[1].request, "7+1");
}
