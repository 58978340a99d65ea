//! Component Registry
//!
//! Dependency-ordered lifecycle manager for named singleton components.
//!
//! # Lifecycle
//!
//! ```text
//! register(...)*  ──►  create_all()  ──►  resolve_order()  ──►  inject_and_start()
//!                                                                     │
//!                         get::<T>(name) ◄────────────────────────────┤
//!                                                                     ▼
//!                                                               stop_all()
//! ```
//!
//! The registry is mutated only during the single-threaded startup phase. Once
//! started it is read-only and can be shared behind an `Arc` without locking.

use crate::components::error::{ComponentError, ComponentResult, MissingDependency};
use crate::components::traits::{downcast_component, Component, Dependencies};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub(crate) type ComponentFactory = Box<dyn Fn() -> Box<dyn Component> + Send + Sync>;

/// Lifecycle state of one registered component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Registered,
    Created,
    Started,
    Stopped,
}

pub(crate) struct Descriptor {
    pub(crate) name: String,
    pub(crate) dependencies: Vec<String>,
    pub(crate) factory: ComponentFactory,
    pending: Option<Box<dyn Component>>,
    instance: Option<Arc<dyn Component>>,
    state: ComponentState,
}

/// Registry of named components and their start order
#[derive(Default)]
pub struct ComponentRegistry {
    descriptors: Vec<Descriptor>,
    index: HashMap<String, usize>,
    created: bool,
    order: Option<Vec<String>>,
    started: Vec<String>,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field(
                "components",
                &self
                    .descriptors
                    .iter()
                    .map(|d| (&d.name, d.state))
                    .collect::<Vec<_>>(),
            )
            .field("order", &self.order)
            .finish()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type under `name`
    ///
    /// The dependency list comes from `T::dependencies()`; instances are built
    /// with `T::default()` by [`create_all`](Self::create_all).
    pub fn register<T>(&mut self, name: &str) -> ComponentResult<()>
    where
        T: Component + Default,
    {
        self.register_factory(name, &T::dependencies(), || Box::new(T::default()))
    }

    /// Register a component built by `factory` with an explicit dependency list
    pub fn register_factory<F>(
        &mut self,
        name: &str,
        dependencies: &[&str],
        factory: F,
    ) -> ComponentResult<()>
    where
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        if self.index.contains_key(name) {
            return Err(ComponentError::AlreadyRegistered {
                name: name.to_string(),
            });
        }
        if self.created {
            return Err(ComponentError::lifecycle(format!(
                "cannot register '{}' after components were created",
                name
            )));
        }

        let mut deps: Vec<String> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !deps.iter().any(|d| d == dep) {
                deps.push(dep.to_string());
            }
        }

        log::debug!("Registered component '{}' (depends on {:?})", name, deps);
        self.index.insert(name.to_string(), self.descriptors.len());
        self.descriptors.push(Descriptor {
            name: name.to_string(),
            dependencies: deps,
            factory: Box::new(factory),
            pending: None,
            instance: None,
            state: ComponentState::Registered,
        });
        Ok(())
    }

    /// Instantiate one instance per registered component
    ///
    /// Constructors run in registration order and must not rely on any other
    /// component being ready.
    pub fn create_all(&mut self) -> ComponentResult<()> {
        if self.created {
            return Err(ComponentError::lifecycle("components were already created"));
        }
        for descriptor in &mut self.descriptors {
            descriptor.pending = Some((descriptor.factory)());
            descriptor.state = ComponentState::Created;
        }
        self.created = true;
        log::debug!("Created {} components", self.descriptors.len());
        Ok(())
    }

    /// Compute the start order with Kahn's algorithm
    ///
    /// Every dependency precedes its dependents. Unknown dependency names fail
    /// with `NotRegistered` listing all of them; if some components cannot be
    /// placed the call fails with `CircularDependency` naming each of them.
    pub fn resolve_order(&mut self) -> ComponentResult<Vec<String>> {
        let order = self.compute_order()?;
        log::info!("Component start order: {}", order.join(" -> "));
        self.order = Some(order.clone());
        Ok(order)
    }

    fn compute_order(&self) -> ComponentResult<Vec<String>> {
        let missing: Vec<MissingDependency> = self
            .descriptors
            .iter()
            .flat_map(|d| {
                d.dependencies
                    .iter()
                    .filter(|dep| !self.index.contains_key(dep.as_str()))
                    .map(|dep| MissingDependency {
                        name: dep.clone(),
                        requested_by: Some(d.name.clone()),
                    })
            })
            .collect();
        if !missing.is_empty() {
            return Err(ComponentError::NotRegistered { missing });
        }

        // Edges run dependency -> dependent
        let count = self.descriptors.len();
        let mut in_degree = vec![0usize; count];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (i, descriptor) in self.descriptors.iter().enumerate() {
            for dep in &descriptor.dependencies {
                let j = self.index[dep.as_str()];
                dependents[j].push(i);
                in_degree[i] += 1;
            }
        }

        let mut ready: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(i) = ready.pop_front() {
            order.push(self.descriptors[i].name.clone());
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if order.len() < count {
            let mut names: Vec<String> = (0..count)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.descriptors[i].name.clone())
                .collect();
            names.sort();
            return Err(ComponentError::CircularDependency { names });
        }

        Ok(order)
    }

    /// Inject dependencies and start every component in resolved order
    ///
    /// By the time a component's start hook runs, each of its dependencies has
    /// completed its own start hook. The first failure aborts startup.
    pub async fn inject_and_start(&mut self) -> ComponentResult<()> {
        if !self.created {
            return Err(ComponentError::lifecycle(
                "create_all must run before inject_and_start",
            ));
        }
        let order = self
            .order
            .clone()
            .ok_or_else(|| ComponentError::lifecycle("resolve_order must run before inject_and_start"))?;

        for name in order {
            let i = self.index[name.as_str()];
            if self.descriptors[i].state != ComponentState::Created {
                continue;
            }

            let dependencies = self.dependencies_for(&name, &self.descriptors[i].dependencies)?;
            let mut component = self.descriptors[i].pending.take().ok_or_else(|| {
                ComponentError::lifecycle(format!("component '{}' has no instance", name))
            })?;

            component
                .inject(&dependencies)
                .map_err(|e| ComponentError::inject_failed(&name, e))?;
            let instance: Arc<dyn Component> = Arc::from(component);
            instance.start().await.map_err(|e| {
                log::error!("Component '{}' failed to start: {}", name, e);
                ComponentError::start_failed(&name, e)
            })?;

            let descriptor = &mut self.descriptors[i];
            descriptor.instance = Some(instance);
            descriptor.state = ComponentState::Started;
            self.started.push(name.clone());
            log::info!("Component '{}' started", name);
        }
        Ok(())
    }

    /// Collect the started instances named in `names` on behalf of `requester`
    ///
    /// Used for components during startup and for scheduler tasks afterwards.
    /// Every unregistered name is reported; they take precedence over names
    /// that are registered but not started yet.
    pub fn dependencies_for(
        &self,
        requester: &str,
        names: &[impl AsRef<str>],
    ) -> ComponentResult<Dependencies> {
        let mut dependencies = Dependencies::new(requester);
        let mut missing = Vec::new();
        let mut not_started = None;
        for name in names {
            let name = name.as_ref();
            match self.started_instance(name) {
                Some(instance) => dependencies.insert(name, instance),
                None if self.index.contains_key(name) => {
                    not_started.get_or_insert_with(|| name.to_string());
                }
                None => missing.push(MissingDependency {
                    name: name.to_string(),
                    requested_by: Some(requester.to_string()),
                }),
            }
        }
        if !missing.is_empty() {
            return Err(ComponentError::NotRegistered { missing });
        }
        if let Some(name) = not_started {
            return Err(ComponentError::lifecycle(format!(
                "'{}' requires '{}' before it has started",
                requester, name
            )));
        }
        Ok(dependencies)
    }

    fn started_instance(&self, name: &str) -> Option<Arc<dyn Component>> {
        let descriptor = &self.descriptors[*self.index.get(name)?];
        match descriptor.state {
            ComponentState::Started => descriptor.instance.clone(),
            _ => None,
        }
    }

    /// Get a started component without downcasting
    pub fn get_dyn(&self, name: &str) -> ComponentResult<Arc<dyn Component>> {
        let i = *self
            .index
            .get(name)
            .ok_or_else(|| ComponentError::not_registered(name))?;
        self.descriptors[i]
            .instance
            .clone()
            .ok_or_else(|| ComponentError::lifecycle(format!("component '{}' has not started", name)))
    }

    /// Get a started component as its concrete type
    pub fn get<T: Component>(&self, name: &str) -> ComponentResult<Arc<T>> {
        downcast_component(name, self.get_dyn(name)?)
    }

    pub fn state(&self, name: &str) -> Option<ComponentState> {
        self.index.get(name).map(|&i| self.descriptors[i].state)
    }

    /// Declared dependency names of `name`
    pub fn dependencies_of(&self, name: &str) -> Option<&[String]> {
        self.index
            .get(name)
            .map(|&i| self.descriptors[i].dependencies.as_slice())
    }

    /// Registered names in registration order
    pub fn names(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }

    /// Resolved start order, once computed
    pub fn order(&self) -> Option<&[String]> {
        self.order.as_deref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub(crate) fn descriptor(&self, name: &str) -> Option<&Descriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// Stop started components in reverse start order
    ///
    /// A failing stop hook is logged and reported but does not prevent the
    /// remaining components from stopping.
    pub async fn stop_all(&mut self) -> Vec<ComponentError> {
        let mut failures = Vec::new();
        while let Some(name) = self.started.pop() {
            let i = self.index[name.as_str()];
            let Some(instance) = self.descriptors[i].instance.clone() else {
                continue;
            };
            match instance.stop().await {
                Ok(()) => log::info!("Component '{}' stopped", name),
                Err(e) => {
                    log::error!("Component '{}' failed to stop: {}", name, e);
                    failures.push(ComponentError::StopFailed {
                        name: name.clone(),
                        cause: e.to_string(),
                    });
                }
            }
            self.descriptors[i].state = ComponentState::Stopped;
        }
        failures
    }
}
