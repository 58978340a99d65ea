//! Component Registry
//!
//! Registers named singleton components, orders them by their declared
//! dependencies, and injects and starts them so that every component starts
//! after everything it depends on.
//!
//! # Example
//!
//! ```rust,no_run
//! use jukebox::components::{Component, ComponentRegistry, ComponentResult, Dependencies};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Catalog;
//!
//! impl Component for Catalog {}
//!
//! #[derive(Default)]
//! struct Player {
//!     catalog: Option<Arc<Catalog>>,
//! }
//!
//! impl Component for Player {
//!     fn dependencies() -> Vec<&'static str> {
//!         vec!["catalog"]
//!     }
//!
//!     fn inject(&mut self, deps: &Dependencies) -> ComponentResult<()> {
//!         self.catalog = Some(deps.get::<Catalog>("catalog")?);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> ComponentResult<()> {
//! let mut registry = ComponentRegistry::new();
//! registry.register::<Player>("player")?;
//! registry.register::<Catalog>("catalog")?;
//!
//! registry.create_all()?;
//! assert_eq!(registry.resolve_order()?, vec!["catalog", "player"]);
//! registry.inject_and_start().await?;
//!
//! let player = registry.get::<Player>("player")?;
//! # Ok(())
//! # }
//! ```

mod error;
mod registry;
mod standalone;
mod traits;

pub use error::{ComponentError, ComponentResult, MissingDependency};
pub use registry::{ComponentRegistry, ComponentState};
pub use standalone::StandaloneResolver;
pub use traits::{AsAnyArc, Component, Dependencies};

#[cfg(test)]
mod tests;
