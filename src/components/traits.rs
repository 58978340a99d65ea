//! Component Trait System
//!
//! A component is a named singleton with declared dependencies, an injection
//! step and a start hook. The dependency list is declared statically per type
//! through [`Component::dependencies`]; the registry orders components from those
//! declarations alone, before any instance exists.

use crate::components::error::{ComponentError, ComponentResult};
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;

/// Upcast helper so `Arc<dyn Component>` can be downcast to its concrete type
pub trait AsAnyArc {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAnyArc for T {
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Base trait for every registered component
///
/// Instances are created by the registry, receive their dependencies through
/// [`inject`](Component::inject) while still exclusively owned, and are shared
/// as `Arc<dyn Component>` from [`start`](Component::start) onwards. State that
/// changes after start therefore needs interior mutability.
#[async_trait::async_trait]
pub trait Component: AsAnyArc + Send + Sync + 'static {
    /// Names of the components this one requires
    fn dependencies() -> Vec<&'static str>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// Receive the already-started dependencies
    ///
    /// Called exactly once, after every dependency has completed its own start
    /// hook.
    fn inject(&mut self, _dependencies: &Dependencies) -> ComponentResult<()> {
        Ok(())
    }

    /// Start hook, called once after injection
    async fn start(&self) -> ComponentResult<()> {
        Ok(())
    }

    /// Stop hook, called in reverse start order at shutdown
    async fn stop(&self) -> ComponentResult<()> {
        Ok(())
    }
}

/// The dependencies handed to one component or task
#[derive(Clone)]
pub struct Dependencies {
    requester: String,
    resolved: HashMap<String, Arc<dyn Component>>,
}

impl Dependencies {
    pub fn new(requester: impl Into<String>) -> Self {
        Self {
            requester: requester.into(),
            resolved: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, instance: Arc<dyn Component>) {
        self.resolved.insert(name.into(), instance);
    }

    /// Name of the component or task these dependencies belong to
    pub fn requester(&self) -> &str {
        &self.requester
    }

    /// Look up a dependency without downcasting
    pub fn get_dyn(&self, name: &str) -> ComponentResult<Arc<dyn Component>> {
        self.resolved
            .get(name)
            .cloned()
            .ok_or_else(|| ComponentError::missing_dependency(name, &self.requester))
    }

    /// Look up a dependency as its concrete type
    pub fn get<T: Component>(&self, name: &str) -> ComponentResult<Arc<T>> {
        downcast_component(name, self.get_dyn(name)?)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolved.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.resolved.keys().collect();
        names.sort();
        f.debug_struct("Dependencies")
            .field("requester", &self.requester)
            .field("resolved", &names)
            .finish()
    }
}

pub(crate) fn downcast_component<T: Component>(
    name: &str,
    instance: Arc<dyn Component>,
) -> ComponentResult<Arc<T>> {
    instance
        .into_any_arc()
        .downcast::<T>()
        .map_err(|_| ComponentError::TypeMismatch {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Catalog;

    impl Component for Catalog {}

    #[derive(Default)]
    struct Player;

    impl Component for Player {
        fn dependencies() -> Vec<&'static str> {
            vec!["catalog"]
        }
    }

    #[test]
    fn test_declared_dependencies() {
        assert!(Catalog::dependencies().is_empty());
        assert_eq!(Player::dependencies(), vec!["catalog"]);
    }

    #[test]
    fn test_typed_lookup_and_mismatch() {
        let mut deps = Dependencies::new("player");
        deps.insert("catalog", Arc::new(Catalog));

        assert!(deps.get::<Catalog>("catalog").is_ok());
        match deps.get::<Player>("catalog") {
            Err(ComponentError::TypeMismatch { name, expected }) => {
                assert_eq!(name, "catalog");
                assert!(expected.ends_with("Player"));
            }
            other => panic!("Expected TypeMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_lookup_names_requester() {
        let deps = Dependencies::new("player");
        assert_eq!(
            deps.get_dyn("voice").map(|_| ()),
            Err(ComponentError::missing_dependency("voice", "player"))
        );
        assert!(deps.is_empty());
    }
}
