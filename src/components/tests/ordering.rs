//! Tests for dependency resolution order, cycle and missing-dependency detection

use super::fixtures::{event_log, position, register_tracked};
use crate::components::{ComponentError, ComponentRegistry, MissingDependency};

fn registry_with(edges: &[(&str, &[&str])]) -> ComponentRegistry {
    let log = event_log();
    let mut registry = ComponentRegistry::new();
    for (name, deps) in edges {
        register_tracked(&mut registry, name, deps, &log).unwrap();
    }
    registry
}

fn assert_topological(registry: &ComponentRegistry, order: &[String]) {
    assert_eq!(order.len(), registry.len(), "every component is placed");
    for name in registry.names() {
        for dep in registry.dependencies_of(&name).unwrap() {
            assert!(
                position(order, dep) < position(order, &name),
                "'{}' must precede '{}' in {:?}",
                dep,
                name,
                order
            );
        }
    }
}

#[test]
fn test_chain_resolves_dependencies_first() {
    let mut registry = registry_with(&[
        ("player", &["voice"]),
        ("voice", &["gateway"]),
        ("gateway", &[]),
    ]);

    let order = registry.resolve_order().unwrap();

    assert_eq!(order, vec!["gateway", "voice", "player"]);
    assert_eq!(registry.order(), Some(order.as_slice()));
}

#[test]
fn test_diamond_graph_is_topological() {
    let mut registry = registry_with(&[
        ("commands", &["player", "search"]),
        ("player", &["config"]),
        ("search", &["config"]),
        ("config", &[]),
    ]);

    let order = registry.resolve_order().unwrap();

    assert_topological(&registry, &order);
    assert_eq!(order.first().map(String::as_str), Some("config"));
    assert_eq!(order.last().map(String::as_str), Some("commands"));
}

#[test]
fn test_independent_components_keep_registration_order() {
    let mut registry = registry_with(&[("c", &[]), ("a", &[]), ("b", &[])]);
    assert_eq!(registry.resolve_order().unwrap(), vec!["c", "a", "b"]);
}

#[test]
fn test_generated_acyclic_graphs_are_topological() {
    // Small deterministic LCG so the graphs vary without a rand dependency
    let mut seed: u64 = 0x5eed;
    let mut next = move || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (seed >> 33) as usize
    };

    for _ in 0..25 {
        let count = 2 + next() % 12;
        let names: Vec<String> = (0..count).map(|i| format!("component-{}", i)).collect();
        let log = event_log();
        let mut registry = ComponentRegistry::new();

        // Only edges to lower indices, registered in shuffled order: always acyclic
        let mut indices: Vec<usize> = (0..count).collect();
        for i in (1..count).rev() {
            indices.swap(i, next() % (i + 1));
        }
        for &i in &indices {
            let deps: Vec<&str> = (0..i)
                .filter(|_| next() % 3 == 0)
                .map(|j| names[j].as_str())
                .collect();
            register_tracked(&mut registry, &names[i], &deps, &log).unwrap();
        }

        let order = registry.resolve_order().unwrap();
        assert_topological(&registry, &order);
    }
}

#[test]
fn test_mutual_dependency_is_circular() {
    let mut registry = registry_with(&[("a", &["b"]), ("b", &["a"])]);

    assert_eq!(
        registry.resolve_order(),
        Err(ComponentError::CircularDependency {
            names: vec!["a".to_string(), "b".to_string()]
        })
    );
    assert_eq!(registry.order(), None);
}

#[test]
fn test_cycle_reports_every_unplaced_component() {
    let mut registry = registry_with(&[
        ("config", &[]),
        ("x", &["z"]),
        ("y", &["x"]),
        ("z", &["y"]),
        ("downstream", &["x", "config"]),
    ]);

    match registry.resolve_order() {
        Err(ComponentError::CircularDependency { names }) => {
            assert_eq!(names, vec!["downstream", "x", "y", "z"]);
        }
        other => panic!("Expected CircularDependency, got {:?}", other),
    }
}

#[test]
fn test_self_dependency_is_circular() {
    let mut registry = registry_with(&[("loopy", &["loopy"])]);
    assert!(matches!(
        registry.resolve_order(),
        Err(ComponentError::CircularDependency { names }) if names == vec!["loopy"]
    ));
}

#[test]
fn test_missing_dependency_names_dependency_and_requester() {
    let mut registry = registry_with(&[("player", &["voice"])]);

    assert_eq!(
        registry.resolve_order(),
        Err(ComponentError::NotRegistered {
            missing: vec![MissingDependency {
                name: "voice".to_string(),
                requested_by: Some("player".to_string()),
            }]
        })
    );
}

#[test]
fn test_all_missing_dependencies_are_reported() {
    let mut registry = registry_with(&[
        ("player", &["voice", "catalog"]),
        ("search", &["catalog"]),
        ("catalog_cache", &[]),
    ]);

    match registry.resolve_order() {
        Err(ComponentError::NotRegistered { missing }) => {
            let pairs: Vec<(String, Option<String>)> = missing
                .into_iter()
                .map(|m| (m.name, m.requested_by))
                .collect();
            assert_eq!(
                pairs,
                vec![
                    ("voice".to_string(), Some("player".to_string())),
                    ("catalog".to_string(), Some("player".to_string())),
                    ("catalog".to_string(), Some("search".to_string())),
                ]
            );
        }
        other => panic!("Expected NotRegistered, got {:?}", other),
    }
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let log = event_log();
    let mut registry = ComponentRegistry::new();
    register_tracked(&mut registry, "player", &[], &log).unwrap();

    assert_eq!(
        register_tracked(&mut registry, "player", &["voice"], &log),
        Err(ComponentError::AlreadyRegistered {
            name: "player".to_string()
        })
    );
    assert_eq!(registry.len(), 1);
    assert!(registry.dependencies_of("player").unwrap().is_empty());
}

#[test]
fn test_duplicate_declared_dependencies_count_once() {
    let mut registry = registry_with(&[("player", &["voice", "voice"]), ("voice", &[])]);

    assert_eq!(registry.dependencies_of("player").unwrap(), ["voice"]);
    assert_eq!(registry.resolve_order().unwrap(), vec!["voice", "player"]);
}

#[test]
fn test_empty_registry_resolves_to_empty_order() {
    let mut registry = ComponentRegistry::new();
    assert!(registry.is_empty());
    assert_eq!(registry.resolve_order().unwrap(), Vec::<String>::new());
}
