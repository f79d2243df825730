//! Offline administration of vendor-supplied policy definitions.
//!
//! The crate splits into a loading side and an operating side. Loading:
//! `defs` parses per-namespace definition files into raw trees, `catalog`
//! merges them (two-phase: parse all, then resolve all) into an immutable
//! `PolicyCatalog`, and `locale` resolves display strings lazily with a
//! per-locale fallback chain. Operating: `element` is the typed codec
//! between user tokens, element values, and store entries; `state` computes
//! a policy's configuration state and stages atomic operation batches; the
//! actual store sits behind the narrow `PolicyStore` trait in `store`.
//!
//! The `policyctl` binary is a thin front end; everything testable lives
//! here and runs against the in-memory store.

pub mod batch;
pub mod catalog;
pub mod defs;
pub mod element;
pub mod error;
pub mod locale;
pub mod search;
pub mod state;
pub mod store;

pub use catalog::{
    Category, CategoryIdent, Namespace, Policy, PolicyCatalog, PolicyClass, PolicyState,
};
pub use element::{DefaultValue, ElementValue, ListEntry, PolicyElement};
pub use error::{EntityKind, PolicyError, Result, StoreError};
pub use locale::{DEFAULT_LOCALE, DisplayString, LocaleResolver};
pub use state::{ElementInput, StateMachine, commit};
pub use store::{MemStore, PolicySnapshot, PolicyStore, StoreEntry, StoreOp, StoreValue};
