//! Policy catalog wiring.
//!
//! This module merges the raw per-namespace trees into one resolved catalog:
//! a flat prefixed-name index, a category tree with declaration-order
//! children, and the supported-on registries. `CatalogBuilder` is the
//! two-phase construction path; `PolicyCatalog` is the immutable result
//! clients hold on to.

pub mod build;
pub mod index;
pub mod model;

pub use build::{BuiltCatalog, CatalogBuilder};
pub use index::PolicyCatalog;
pub use model::{
    Category, CategoryIdent, Namespace, Policy, PolicyClass, PolicyState, SupportIdent,
    SupportRange, SupportedOnDefinition, SupportedProduct, SupportedVersion,
};
