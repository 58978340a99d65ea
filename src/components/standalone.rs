//! Standalone component resolution
//!
//! Builds one component and its transitive dependencies on demand, without
//! creating or starting anything else in the registry. Tests use it to start a
//! single component against fakes seeded for some of its dependencies.

use crate::components::error::{ComponentError, ComponentResult};
use crate::components::registry::ComponentRegistry;
use crate::components::traits::{downcast_component, Component, Dependencies};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

/// Depth-first, memoised resolver over a registry's registrations
///
/// Instances built here are independent of the registry's own singletons.
pub struct StandaloneResolver<'r> {
    registry: &'r ComponentRegistry,
    built: HashMap<String, Arc<dyn Component>>,
}

impl<'r> StandaloneResolver<'r> {
    pub fn new(registry: &'r ComponentRegistry) -> Self {
        Self {
            registry,
            built: HashMap::new(),
        }
    }

    /// Pre-seed an instance used in place of the registered component
    ///
    /// Seeded instances are handed out as-is: they are not injected or started.
    pub fn seed(&mut self, name: &str, instance: Arc<dyn Component>) -> &mut Self {
        self.built.insert(name.to_string(), instance);
        self
    }

    /// Whether `name` has been built or seeded
    pub fn is_built(&self, name: &str) -> bool {
        self.built.contains_key(name)
    }

    /// Number of instances built or seeded so far
    pub fn built_count(&self) -> usize {
        self.built.len()
    }

    /// Build, inject and start `name` and everything it depends on
    pub async fn resolve(&mut self, name: &str) -> ComponentResult<Arc<dyn Component>> {
        let mut path = Vec::new();
        self.resolve_inner(name.to_string(), None, &mut path).await
    }

    /// As [`resolve`](Self::resolve), downcast to the concrete type
    pub async fn resolve_as<T: Component>(&mut self, name: &str) -> ComponentResult<Arc<T>> {
        let instance = self.resolve(name).await?;
        downcast_component(name, instance)
    }

    fn resolve_inner<'a>(
        &'a mut self,
        name: String,
        requester: Option<String>,
        path: &'a mut Vec<String>,
    ) -> BoxFuture<'a, ComponentResult<Arc<dyn Component>>> {
        Box::pin(async move {
            if let Some(instance) = self.built.get(&name) {
                return Ok(Arc::clone(instance));
            }

            if let Some(position) = path.iter().position(|n| *n == name) {
                let mut names = path[position..].to_vec();
                names.sort();
                return Err(ComponentError::CircularDependency { names });
            }

            let registry = self.registry;
            let descriptor = registry.descriptor(&name).ok_or_else(|| match &requester {
                Some(requester) => ComponentError::missing_dependency(&name, requester),
                None => ComponentError::not_registered(&name),
            })?;

            path.push(name.clone());
            let mut dependencies = Dependencies::new(&name);
            for dep in &descriptor.dependencies {
                let instance = self
                    .resolve_inner(dep.clone(), Some(name.clone()), &mut *path)
                    .await?;
                dependencies.insert(dep, instance);
            }
            path.pop();

            let mut component = (descriptor.factory)();
            component
                .inject(&dependencies)
                .map_err(|e| ComponentError::inject_failed(&name, e))?;
            let instance: Arc<dyn Component> = Arc::from(component);
            instance
                .start()
                .await
                .map_err(|e| ComponentError::start_failed(&name, e))?;
            log::debug!("Standalone component '{}' started", name);

            self.built.insert(name, Arc::clone(&instance));
            Ok(instance)
        })
    }
}
