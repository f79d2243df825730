//! Built catalog types: immutable after `CatalogBuilder::build`.
//!
//! Raw trees keep references as strings; everything here is resolved. The
//! only later mutation anywhere in the catalog is the locale string cache,
//! which lives in its own module.

use crate::element::{PolicyElement, StoreRecord};
use crate::store::StoreValue;

/// A definition file's vocabulary: the namespace name plus the prefix used in
/// public policy identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub name: String,
    pub prefix: String,
    /// File-name stem pairing this namespace with its resource files.
    pub stem: String,
}

/// Unique key for a category across all loaded files.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CategoryIdent {
    pub namespace: String,
    pub name: String,
}

impl CategoryIdent {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for CategoryIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct Category {
    pub ident: CategoryIdent,
    /// Resolved parent; `None` for declared roots and for orphans.
    pub parent: Option<CategoryIdent>,
    pub display_key: String,
    /// Child categories in declaration order.
    pub children: Vec<CategoryIdent>,
    /// Directly owned policies (prefixed names) in declaration order.
    pub policies: Vec<String>,
    /// Parent reference could not be resolved; attached under the root.
    pub orphaned: bool,
}

/// Scope a policy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyClass {
    Machine,
    User,
    Both,
}

impl std::fmt::Display for PolicyClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Machine => write!(f, "machine"),
            Self::User => write!(f, "user"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Qualified name of a supported-on entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SupportIdent {
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for SupportIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Versioned product identifier; ordering indices are display-only.
#[derive(Debug, Clone)]
pub struct SupportedProduct {
    pub ident: SupportIdent,
    pub display_key: String,
    pub index: u32,
    pub major_versions: Vec<SupportedVersion>,
}

#[derive(Debug, Clone)]
pub struct SupportedVersion {
    pub name: String,
    pub display_key: String,
    pub index: u32,
    pub minor_versions: Vec<SupportedVersion>,
}

/// Named eligibility condition combining version ranges and references to
/// other conditions. Display-only; never enforced by the core.
#[derive(Debug, Clone)]
pub struct SupportedOnDefinition {
    pub ident: SupportIdent,
    pub display_key: String,
    pub ranges: Vec<SupportRange>,
    pub references: Vec<SupportIdent>,
}

#[derive(Debug, Clone)]
pub struct SupportRange {
    pub product: SupportIdent,
    pub min_version: Option<u32>,
    pub max_version: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Policy {
    /// `namespace-prefix.name`; the catalog-wide identity key.
    pub prefixed_name: String,
    pub name: String,
    pub namespace: String,
    pub class: PolicyClass,
    pub display_key: String,
    pub explain_key: Option<String>,
    /// Target store key for the primary value and element defaults.
    pub key: String,
    pub value_name: Option<String>,
    pub category: Option<CategoryIdent>,
    pub supported_on: Option<SupportIdent>,
    pub enabled_value: Option<StoreValue>,
    pub disabled_value: Option<StoreValue>,
    /// Extra records written on Enable / Disable regardless of elements.
    pub enabled_list: Vec<StoreRecord>,
    pub disabled_list: Vec<StoreRecord>,
    /// Elements in declaration order.
    pub elements: Vec<PolicyElement>,
}

impl Policy {
    pub fn element(&self, id: &str) -> Option<&PolicyElement> {
        self.elements.iter().find(|e| e.id() == id)
    }

    /// Sentinel written on Enable: the configured value, or the implicit
    /// `u32 1` when the policy names a primary value without one.
    pub fn effective_enabled_value(&self) -> Option<StoreValue> {
        match (&self.enabled_value, &self.value_name) {
            (Some(value), _) => Some(value.clone()),
            (None, Some(_)) => Some(StoreValue::U32(1)),
            (None, None) => None,
        }
    }

    /// Sentinel written on Disable; implicit `u32 0` counterpart.
    pub fn effective_disabled_value(&self) -> Option<StoreValue> {
        match (&self.disabled_value, &self.value_name) {
            (Some(value), _) => Some(value.clone()),
            (None, Some(_)) => Some(StoreValue::U32(0)),
            (None, None) => None,
        }
    }

    /// Whether an explicit sentinel pair was configured (as opposed to the
    /// implicit 1/0 fallback).
    pub fn has_explicit_sentinels(&self) -> bool {
        self.enabled_value.is_some() || self.disabled_value.is_some()
    }

    /// Every store key this policy can touch, for snapshot collection.
    pub fn touched_keys(&self) -> Vec<String> {
        let mut keys = vec![self.key.clone()];
        keys.extend(self.enabled_list.iter().map(|r| r.key.clone()));
        keys.extend(self.disabled_list.iter().map(|r| r.key.clone()));
        for element in &self.elements {
            keys.extend(element.touched_keys());
        }
        keys
    }
}

/// Current configuration state of a policy in one store scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    /// Snapshot read failed.
    Unknown,
    NotConfigured,
    Enabled,
    Disabled,
    /// Present but inconsistent data.
    Suspect,
}

impl std::fmt::Display for PolicyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::NotConfigured => write!(f, "not configured"),
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
            Self::Suspect => write!(f, "suspect"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_policy() -> Policy {
        Policy {
            prefixed_name: "corp.telemetry".into(),
            name: "telemetry".into(),
            namespace: "Corp.System".into(),
            class: PolicyClass::Machine,
            display_key: "telemetry_name".into(),
            explain_key: None,
            key: "Software/Corp/System".into(),
            value_name: Some("Telemetry".into()),
            category: None,
            supported_on: None,
            enabled_value: None,
            disabled_value: None,
            enabled_list: Vec::new(),
            disabled_list: Vec::new(),
            elements: Vec::new(),
        }
    }

    #[test]
    fn implicit_sentinels_fall_back_to_one_and_zero() {
        let policy = bare_policy();
        assert_eq!(policy.effective_enabled_value(), Some(StoreValue::U32(1)));
        assert_eq!(policy.effective_disabled_value(), Some(StoreValue::U32(0)));
        assert!(!policy.has_explicit_sentinels());
    }

    #[test]
    fn explicit_sentinels_win() {
        let mut policy = bare_policy();
        policy.enabled_value = Some(StoreValue::Text("on".into()));
        assert_eq!(
            policy.effective_enabled_value(),
            Some(StoreValue::Text("on".into()))
        );
        assert!(policy.has_explicit_sentinels());
    }

    #[test]
    fn no_value_name_means_no_sentinel() {
        let mut policy = bare_policy();
        policy.value_name = None;
        assert_eq!(policy.effective_enabled_value(), None);
        assert_eq!(policy.effective_disabled_value(), None);
    }
}
