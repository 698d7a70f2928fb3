//! Integration tests for reparent and reorder through the engine.
//!
//! Org chart used throughout:
//! ```text
//! Acme (company, 0)
//! ├── Ops (division, 1)
//! │   ├── Platform (department, 2)
//! │   │   └── Infra (team, 3) [e1, e2]
//! │   └── Security (department, 2)
//! └── Sales (division, 1)
//!     └── Field (department, 2) [e3]
//! ```

use orgtree::domain::{
    DomainError, EngineConfig, NodeAttrs, NodeId, NodeKind, OrgUnitAttrs, TreeEngine, TreeStore,
    UnitType,
};
use orgtree::util::testing;
use rstest::{fixture, rstest};

struct Org {
    engine: TreeEngine,
    acme: NodeId,
    ops: NodeId,
    platform: NodeId,
    infra: NodeId,
    security: NodeId,
    sales: NodeId,
    field: NodeId,
}

fn add(engine: &mut TreeEngine, parent: Option<NodeId>, name: &str, t: UnitType, employees: &[&str]) -> NodeId {
    let attrs = OrgUnitAttrs::new(name, name, t).with_employees(employees.iter().copied());
    engine
        .create_node(parent, NodeKind::OrgUnit, None, NodeAttrs::OrgUnit(attrs))
        .unwrap()
        .id
}

#[fixture]
fn org() -> Org {
    testing::init_test_setup();
    let mut engine = TreeEngine::new(TreeStore::new(), EngineConfig::default());
    let acme = add(&mut engine, None, "Acme", UnitType::Company, &[]);
    let ops = add(&mut engine, Some(acme), "Ops", UnitType::Division, &[]);
    let platform = add(&mut engine, Some(ops), "Platform", UnitType::Department, &[]);
    let infra = add(&mut engine, Some(platform), "Infra", UnitType::Team, &["e1", "e2"]);
    let security = add(&mut engine, Some(ops), "Security", UnitType::Department, &[]);
    let sales = add(&mut engine, Some(acme), "Sales", UnitType::Division, &[]);
    let field = add(&mut engine, Some(sales), "Field", UnitType::Department, &["e3"]);
    Org {
        engine,
        acme,
        ops,
        platform,
        infra,
        security,
        sales,
        field,
    }
}

fn snapshot(engine: &TreeEngine) -> Vec<orgtree::domain::Node> {
    engine.store().iter().map(|(_, n)| n.clone()).collect()
}

// ============================================================
// reparent
// ============================================================

#[rstest]
fn given_team_when_moved_to_other_department_then_appended_and_counts_follow(mut org: Org) {
    // Act
    let changed = org.engine.move_node(org.infra, org.security).unwrap();

    // Assert
    let infra = org.engine.get(org.infra).unwrap();
    assert_eq!(infra.parent_id, Some(org.security));
    assert_eq!(infra.level, 3);
    assert_eq!(org.engine.get(org.security).unwrap().children, vec![org.infra]);
    assert_eq!(org.engine.get(org.platform).unwrap().employee_count, 0);
    assert_eq!(org.engine.get(org.security).unwrap().employee_count, 2);
    assert_eq!(org.engine.get(org.ops).unwrap().employee_count, 2);

    let ids: Vec<NodeId> = changed.iter().map(|n| n.id).collect();
    assert!(ids.contains(&org.infra));
    assert!(ids.contains(&org.platform));
    assert!(ids.contains(&org.security));
    org.engine.store().check_invariants().unwrap();
}

#[rstest]
fn given_department_when_moved_across_divisions_then_aggregates_move_up_both_chains(mut org: Org) {
    org.engine.move_node(org.platform, org.sales).unwrap();

    assert_eq!(org.engine.get(org.ops).unwrap().employee_count, 0);
    assert_eq!(org.engine.get(org.sales).unwrap().employee_count, 3);
    assert_eq!(org.engine.get(org.acme).unwrap().employee_count, 3);
    assert_eq!(org.engine.get(org.infra).unwrap().level, 3);
}

#[rstest]
fn given_node_when_dropped_on_current_parent_then_noop(mut org: Org) {
    let before = snapshot(&org.engine);

    let changed = org.engine.move_node(org.infra, org.platform).unwrap();

    assert!(changed.is_empty());
    assert_eq!(snapshot(&org.engine), before);
}

#[rstest]
fn given_department_when_moved_under_company_then_level_mismatch(mut org: Org) {
    let err = org.engine.move_node(org.security, org.acme).unwrap_err();

    assert_eq!(
        err,
        DomainError::LevelMismatch {
            node: org.security,
            target: org.acme,
            target_level: 0,
            expected_level: 1
        }
    );
}

#[rstest]
#[case::division(1)]
#[case::company(0)]
fn given_locked_level_when_moved_then_immovable(mut org: Org, #[case] level: u32) {
    // a target outside the node's subtree; the lock is checked before the level rule
    let (id, target) = if level == 0 {
        let globex = add(&mut org.engine, None, "Globex", UnitType::Company, &[]);
        (org.acme, globex)
    } else {
        (org.ops, org.sales)
    };

    let err = org.engine.move_node(id, target).unwrap_err();

    assert!(
        matches!(err, DomainError::ImmovableNode { level: l, .. } if l == level),
        "unexpected error: {:?}",
        err
    );
}

#[rstest]
fn given_department_when_moved_under_own_team_then_cyclic_move_and_unchanged(mut org: Org) {
    let before = snapshot(&org.engine);

    let err = org.engine.move_node(org.platform, org.infra).unwrap_err();

    assert_eq!(
        err,
        DomainError::CyclicMove {
            node: org.platform,
            target: org.infra
        }
    );
    assert_eq!(snapshot(&org.engine), before);
}

#[rstest]
fn given_node_when_moved_onto_itself_then_cyclic_move(mut org: Org) {
    let err = org.engine.move_node(org.platform, org.platform).unwrap_err();
    assert!(matches!(err, DomainError::CyclicMove { .. }));
}

#[rstest]
fn given_unknown_target_when_moved_then_invalid_parent(mut org: Org) {
    let missing = NodeId::new();
    let err = org.engine.move_node(org.platform, missing).unwrap_err();
    assert_eq!(err, DomainError::InvalidParent(missing));
}

// ============================================================
// reorder
// ============================================================

#[rstest]
fn given_siblings_when_reordered_then_only_orders_swap(mut org: Org) {
    // Arrange
    let before = snapshot(&org.engine);
    let platform_order = org.engine.get(org.platform).unwrap().order;
    let security_order = org.engine.get(org.security).unwrap().order;

    // Act
    let changed = org.engine.reorder_siblings(org.platform, org.security).unwrap();

    // Assert
    assert_eq!(org.engine.get(org.platform).unwrap().order, security_order);
    assert_eq!(org.engine.get(org.security).unwrap().order, platform_order);
    assert_eq!(org.engine.get(org.ops).unwrap().children, vec![org.security, org.platform]);

    // every other node, and every other field, untouched
    for old in before {
        let new = org.engine.get(old.id).unwrap();
        if old.id == org.platform || old.id == org.security {
            assert_eq!(new.attrs, old.attrs);
            assert_eq!(new.parent_id, old.parent_id);
        } else if old.id != org.ops {
            assert_eq!(new, &old);
        }
    }
    let ids: Vec<NodeId> = changed.iter().map(|n| n.id).collect();
    assert!(ids.contains(&org.platform) && ids.contains(&org.security));
}

#[rstest]
fn given_cousins_when_reordered_then_sibling_mismatch(mut org: Org) {
    let err = org.engine.reorder_siblings(org.platform, org.field).unwrap_err();
    assert_eq!(
        err,
        DomainError::SiblingMismatch {
            a: org.platform,
            b: org.field
        }
    );
}

#[rstest]
fn given_locked_divisions_when_reordered_then_immovable(mut org: Org) {
    let err = org.engine.reorder_siblings(org.ops, org.sales).unwrap_err();
    assert!(matches!(err, DomainError::ImmovableNode { .. }));
}
