//! Raw serde trees for definition and resource files.
//!
//! Types here mirror the on-disk JSON shape one file at a time. References to
//! other namespaces stay as unparsed `prefix:name` strings; nothing in this
//! module looks across files. The catalog builder owns merging and
//! resolution.

use crate::store::StoreValue;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Version marker required at the top of every definition file.
pub const DEFINITION_SCHEMA_VERSION: &str = "policy_defs_v1";
/// Version marker required at the top of every resource file.
pub const STRINGS_SCHEMA_VERSION: &str = "policy_strings_v1";

#[derive(Debug, Clone, Deserialize)]
pub struct RawDefinitionFile {
    pub schema_version: String,
    pub namespace: RawNamespace,
    /// Foreign namespaces this file references. All are mandatory: an entry
    /// that is still unresolved after every file is loaded fails the build.
    #[serde(default)]
    pub using: Vec<RawNamespace>,
    #[serde(default)]
    pub supported_on: Option<RawSupportedOn>,
    #[serde(default)]
    pub categories: Vec<RawCategory>,
    #[serde(default)]
    pub policies: Vec<RawPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNamespace {
    pub name: String,
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCategory {
    pub name: String,
    pub display_key: String,
    /// `prefix:name` or bare `name` (same namespace); `None` parks the
    /// category directly under the synthetic root.
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSupportedOn {
    #[serde(default)]
    pub products: Vec<RawProduct>,
    #[serde(default)]
    pub definitions: Vec<RawSupportDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawProduct {
    pub name: String,
    pub display_key: String,
    /// Ordering index among sibling products; display only.
    pub index: u32,
    #[serde(default)]
    pub major_versions: Vec<RawProductVersion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawProductVersion {
    pub name: String,
    pub display_key: String,
    pub index: u32,
    #[serde(default)]
    pub minor_versions: Vec<RawMinorVersion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMinorVersion {
    pub name: String,
    pub display_key: String,
    pub index: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSupportDefinition {
    pub name: String,
    pub display_key: String,
    /// Version ranges over products declared anywhere in the catalog.
    #[serde(default)]
    pub ranges: Vec<RawSupportRange>,
    /// References to other supported-on definitions, `prefix:name` or bare.
    #[serde(default)]
    pub references: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSupportRange {
    /// Product reference, `prefix:name` or bare.
    pub product: String,
    #[serde(default)]
    pub min_version: Option<u32>,
    #[serde(default)]
    pub max_version: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawClass {
    Machine,
    User,
    Both,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPolicy {
    pub name: String,
    pub class: RawClass,
    pub display_key: String,
    #[serde(default)]
    pub explain_key: Option<String>,
    /// Target store key for the primary value and the element default.
    pub key: String,
    #[serde(default)]
    pub value_name: Option<String>,
    /// Owning category reference, `prefix:name` or bare.
    #[serde(default)]
    pub category: Option<String>,
    /// Supported-on reference, `prefix:name` or bare.
    #[serde(default)]
    pub supported_on: Option<String>,
    /// Primary sentinel written on Enable; implicit `u32 1` when absent.
    #[serde(default)]
    pub enabled_value: Option<StoreValue>,
    /// Primary sentinel written on Disable; implicit `u32 0` when absent.
    #[serde(default)]
    pub disabled_value: Option<StoreValue>,
    /// Extra entries written on Enable and deleted on Disable/clear,
    /// independent of elements.
    #[serde(default)]
    pub enabled_list: Vec<RawStoreRecord>,
    #[serde(default)]
    pub disabled_list: Vec<RawStoreRecord>,
    #[serde(default)]
    pub elements: Vec<RawElement>,
}

/// A concrete store record in a definition file. Key and value name default
/// to the owning policy's (or element's) when unset.
#[derive(Debug, Clone, Deserialize)]
pub struct RawStoreRecord {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value_name: Option<String>,
    pub value: StoreValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawElement {
    Boolean {
        id: String,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        value_name: Option<String>,
        #[serde(default)]
        required: bool,
        /// Records written when true. Empty means the implicit `u32 1`.
        #[serde(default)]
        on_true: Vec<RawStoreRecord>,
        /// Records written when false. Empty means delete-the-entry.
        #[serde(default)]
        on_false: Vec<RawStoreRecord>,
    },
    Decimal {
        id: String,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        value_name: Option<String>,
        #[serde(default)]
        required: bool,
        #[serde(default)]
        min: u32,
        #[serde(default = "default_decimal_max")]
        max: u32,
        /// Render through a textual store entry instead of a numeric one.
        #[serde(default)]
        store_as_text: bool,
    },
    LongDecimal {
        id: String,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        value_name: Option<String>,
        #[serde(default)]
        required: bool,
        #[serde(default)]
        min: u64,
        #[serde(default = "default_long_decimal_max")]
        max: u64,
        #[serde(default)]
        store_as_text: bool,
    },
    Text {
        id: String,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        value_name: Option<String>,
        #[serde(default)]
        required: bool,
        #[serde(default)]
        max_length: Option<u32>,
        #[serde(default)]
        expandable: bool,
    },
    MultiText {
        id: String,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        value_name: Option<String>,
        #[serde(default)]
        required: bool,
    },
    Enum {
        id: String,
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        value_name: Option<String>,
        #[serde(default)]
        required: bool,
        items: Vec<RawEnumItem>,
    },
    List {
        id: String,
        /// Lists own a whole key; unlike scalar elements there is no single
        /// value name to inherit, so the key is mandatory in the schema.
        key: String,
        #[serde(default)]
        required: bool,
        /// Entries are `name=value` pairs instead of bare values.
        #[serde(default)]
        explicit_pairs: bool,
    },
}

impl RawElement {
    pub fn id(&self) -> &str {
        match self {
            Self::Boolean { id, .. }
            | Self::Decimal { id, .. }
            | Self::LongDecimal { id, .. }
            | Self::Text { id, .. }
            | Self::MultiText { id, .. }
            | Self::Enum { id, .. }
            | Self::List { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEnumItem {
    pub id: String,
    pub display_key: String,
    pub value: StoreValue,
    /// Extra records written alongside the primary value when this item is
    /// selected.
    #[serde(default)]
    pub subvalues: Vec<RawStoreRecord>,
}

fn default_decimal_max() -> u32 {
    u32::MAX
}

fn default_long_decimal_max() -> u64 {
    u64::MAX
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStringsFile {
    pub schema_version: String,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub strings: BTreeMap<String, String>,
}
