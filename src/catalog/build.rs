//! Two-phase catalog construction.
//!
//! Phase one: `register` merges parsed files into the namespace table, the
//! single serialization point; files can arrive in any order. Phase two:
//! `build` resolves every recorded reference against the completed table.
//! Anything ambiguous about identity (duplicate namespaces, prefixed-name
//! collisions, inverted bounds) is fatal; anything about placement or
//! display (unresolved parents, bare-name collisions, dangling supported-on
//! references) is recorded as a warning and degraded gracefully.

use crate::catalog::model::{
    Category, CategoryIdent, Namespace, Policy, PolicyClass, SupportIdent, SupportRange,
    SupportedOnDefinition, SupportedProduct, SupportedVersion,
};
use crate::defs::loader::DefinitionSource;
use crate::defs::model::{
    RawClass, RawElement, RawPolicy, RawProductVersion, RawStoreRecord,
};
use crate::element::{
    BooleanElement, DecimalElement, EnumElement, EnumItem, ListElement, LongDecimalElement,
    MultiTextElement, PolicyElement, StoreRecord, TextElement,
};
use crate::error::{PolicyError, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

pub struct CatalogBuilder {
    slots: BTreeMap<String, SourceSlot>,
    /// Registration order; drives deterministic tree and policy ordering.
    order: Vec<String>,
    warnings: Vec<String>,
}

struct SourceSlot {
    source_name: String,
    stem: String,
    source: DefinitionSource,
    /// Local prefix -> namespace name, own prefix included.
    prefixes: BTreeMap<String, String>,
}

/// Everything `build` produces; the catalog facade wraps this.
pub struct BuiltCatalog {
    pub namespaces: BTreeMap<String, Namespace>,
    pub policies: BTreeMap<String, Policy>,
    pub categories: BTreeMap<CategoryIdent, Category>,
    /// Top-level categories (declared roots first, then orphans), in
    /// deterministic order.
    pub root: Vec<CategoryIdent>,
    pub products: BTreeMap<SupportIdent, SupportedProduct>,
    pub support_definitions: BTreeMap<SupportIdent, SupportedOnDefinition>,
    pub warnings: Vec<String>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            order: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Merge one parsed file into the namespace table. This is the only
    /// write path into the table; callers must not interleave it with reads.
    pub fn register(&mut self, source: DefinitionSource) -> Result<()> {
        let ns_name = source.raw.namespace.name.clone();
        if let Some(existing) = self.slots.get(&ns_name) {
            return Err(PolicyError::definition(
                source_label(&source),
                format!(
                    "namespace '{ns_name}' already declared by {}",
                    existing.source_name
                ),
            ));
        }

        let mut prefixes = BTreeMap::new();
        prefixes.insert(source.raw.namespace.prefix.clone(), ns_name.clone());
        for using in &source.raw.using {
            if prefixes
                .insert(using.prefix.clone(), using.name.clone())
                .is_some()
            {
                return Err(PolicyError::definition(
                    source_label(&source),
                    format!("prefix '{}' declared twice", using.prefix),
                ));
            }
        }

        let duplicate_prefix = self
            .slots
            .values()
            .find(|slot| slot.source.raw.namespace.prefix == source.raw.namespace.prefix)
            .map(|slot| slot.source_name.clone());
        if let Some(other_name) = duplicate_prefix {
            self.warn(format!(
                "prefix '{}' is used by both {other_name} and {}",
                source.raw.namespace.prefix,
                source_label(&source)
            ));
        }

        self.order.push(ns_name.clone());
        self.slots.insert(
            ns_name,
            SourceSlot {
                source_name: source_label(&source),
                stem: source.stem.clone(),
                source,
                prefixes,
            },
        );
        Ok(())
    }

    /// Resolve every reference against the completed table.
    pub fn build(mut self) -> Result<BuiltCatalog> {
        self.check_mandatory_namespaces()?;

        let namespaces = self.collect_namespaces();
        let (products, support_definitions) = self.build_supported_on();
        let (categories, root) = self.build_category_tree();
        let policies = self.build_policies(&categories, &support_definitions)?;

        // Now attach policies to their categories in declaration order.
        let mut categories = categories;
        let mut pending_warnings = Vec::new();
        for ns_name in &self.order {
            let slot = &self.slots[ns_name];
            for raw in &slot.source.raw.policies {
                let Some(reference) = &raw.category else {
                    continue;
                };
                let prefixed = format!("{}.{}", slot.source.raw.namespace.prefix, raw.name);
                match self.resolve_reference(slot, reference) {
                    Some((namespace, name)) => {
                        let ident = CategoryIdent::new(namespace, name);
                        match categories.get_mut(&ident) {
                            Some(category) => category.policies.push(prefixed),
                            None => pending_warnings.push(format!(
                                "{}: policy '{prefixed}' references unknown category '{reference}'",
                                slot.source_name
                            )),
                        }
                    }
                    None => pending_warnings.push(format!(
                        "{}: policy '{prefixed}' category reference '{reference}' uses an undeclared prefix",
                        slot.source_name
                    )),
                }
            }
        }
        for warning in pending_warnings {
            self.warn(warning);
        }

        Ok(BuiltCatalog {
            namespaces,
            policies,
            categories,
            root,
            products,
            support_definitions,
            warnings: self.warnings,
        })
    }

    fn check_mandatory_namespaces(&self) -> Result<()> {
        for ns_name in &self.order {
            let slot = &self.slots[ns_name];
            for using in &slot.source.raw.using {
                if !self.slots.contains_key(&using.name) {
                    return Err(PolicyError::definition(
                        slot.source_name.clone(),
                        format!("required namespace '{}' was not loaded", using.name),
                    ));
                }
            }
        }
        Ok(())
    }

    fn collect_namespaces(&self) -> BTreeMap<String, Namespace> {
        self.slots
            .iter()
            .map(|(name, slot)| {
                (
                    name.clone(),
                    Namespace {
                        name: name.clone(),
                        prefix: slot.source.raw.namespace.prefix.clone(),
                        stem: slot.stem.clone(),
                    },
                )
            })
            .collect()
    }

    /// `prefix:name` or bare `name` -> (namespace, name). `None` when the
    /// prefix is not declared in the referencing file.
    fn resolve_reference(&self, slot: &SourceSlot, reference: &str) -> Option<(String, String)> {
        match reference.split_once(':') {
            Some((prefix, name)) => slot
                .prefixes
                .get(prefix)
                .map(|ns| (ns.clone(), name.to_string())),
            None => Some((
                slot.source.raw.namespace.name.clone(),
                reference.to_string(),
            )),
        }
    }

    fn build_category_tree(&mut self) -> (BTreeMap<CategoryIdent, Category>, Vec<CategoryIdent>) {
        let mut categories: BTreeMap<CategoryIdent, Category> = BTreeMap::new();
        // Pass 1: nodes.
        for ns_name in &self.order {
            let slot = &self.slots[ns_name];
            for raw in &slot.source.raw.categories {
                let ident = CategoryIdent::new(ns_name.clone(), raw.name.clone());
                categories.insert(
                    ident.clone(),
                    Category {
                        ident,
                        parent: None,
                        display_key: raw.display_key.clone(),
                        children: Vec::new(),
                        policies: Vec::new(),
                        orphaned: false,
                    },
                );
            }
        }

        // Pass 2: parent wiring in declaration order.
        let mut root = Vec::new();
        let mut pending_warnings = Vec::new();
        for ns_name in &self.order {
            let slot = &self.slots[ns_name];
            for raw in &slot.source.raw.categories {
                let ident = CategoryIdent::new(ns_name.clone(), raw.name.clone());
                let Some(reference) = &raw.parent else {
                    root.push(ident);
                    continue;
                };
                let resolved = self
                    .resolve_reference(slot, reference)
                    .map(|(ns, name)| CategoryIdent::new(ns, name))
                    .filter(|parent| categories.contains_key(parent));
                match resolved {
                    Some(parent_ident) if parent_ident != ident => {
                        categories
                            .get_mut(&parent_ident)
                            .expect("filtered above")
                            .children
                            .push(ident.clone());
                        categories.get_mut(&ident).expect("pass 1").parent =
                            Some(parent_ident);
                    }
                    _ => {
                        pending_warnings.push(format!(
                            "{}: category '{ident}' parent '{reference}' is unresolved; attached under root",
                            slot.source_name
                        ));
                        categories.get_mut(&ident).expect("pass 1").orphaned = true;
                        root.push(ident);
                    }
                }
            }
        }

        // Pass 3: break parent cycles; every member of a cycle would
        // otherwise be unreachable from the root.
        let idents: Vec<CategoryIdent> = categories.keys().cloned().collect();
        for ident in idents {
            let mut path: Vec<CategoryIdent> = vec![ident.clone()];
            let mut current = ident;
            while let Some(parent) = categories[&current].parent.clone() {
                if path.contains(&parent) {
                    let node = categories.get_mut(&parent).expect("on path");
                    let old_parent = node.parent.take().expect("in a cycle");
                    node.orphaned = true;
                    categories
                        .get_mut(&old_parent)
                        .expect("cycle member")
                        .children
                        .retain(|c| *c != parent);
                    pending_warnings.push(format!(
                        "category '{parent}' is part of a parent cycle; attached under root"
                    ));
                    root.push(parent);
                    break;
                }
                path.push(parent.clone());
                current = parent;
            }
        }

        for warning in pending_warnings {
            self.warn(warning);
        }
        (categories, root)
    }

    fn build_supported_on(
        &mut self,
    ) -> (
        BTreeMap<SupportIdent, SupportedProduct>,
        BTreeMap<SupportIdent, SupportedOnDefinition>,
    ) {
        let mut products = BTreeMap::new();
        let mut definitions = BTreeMap::new();
        let mut pending_warnings = Vec::new();

        for ns_name in &self.order {
            let slot = &self.slots[ns_name];
            let Some(supported) = &slot.source.raw.supported_on else {
                continue;
            };
            for raw in &supported.products {
                let ident = SupportIdent {
                    namespace: ns_name.clone(),
                    name: raw.name.clone(),
                };
                products.insert(
                    ident.clone(),
                    SupportedProduct {
                        ident,
                        display_key: raw.display_key.clone(),
                        index: raw.index,
                        major_versions: raw.major_versions.iter().map(version_from_raw).collect(),
                    },
                );
            }
        }

        for ns_name in &self.order {
            let slot = &self.slots[ns_name];
            let Some(supported) = &slot.source.raw.supported_on else {
                continue;
            };
            for raw in &supported.definitions {
                let ident = SupportIdent {
                    namespace: ns_name.clone(),
                    name: raw.name.clone(),
                };
                let mut ranges = Vec::new();
                for range in &raw.ranges {
                    match self
                        .resolve_reference(slot, &range.product)
                        .map(|(ns, name)| SupportIdent {
                            namespace: ns,
                            name,
                        })
                        .filter(|product| products.contains_key(product))
                    {
                        Some(product) => ranges.push(SupportRange {
                            product,
                            min_version: range.min_version,
                            max_version: range.max_version,
                        }),
                        None => pending_warnings.push(format!(
                            "{}: supported-on '{ident}' references unknown product '{}'",
                            slot.source_name, range.product
                        )),
                    }
                }
                let mut references = Vec::new();
                for reference in &raw.references {
                    match self.resolve_reference(slot, reference).map(|(ns, name)| {
                        SupportIdent {
                            namespace: ns,
                            name,
                        }
                    }) {
                        Some(target) => references.push(target),
                        None => pending_warnings.push(format!(
                            "{}: supported-on '{ident}' reference '{reference}' uses an undeclared prefix",
                            slot.source_name
                        )),
                    }
                }
                definitions.insert(
                    ident.clone(),
                    SupportedOnDefinition {
                        ident,
                        display_key: raw.display_key.clone(),
                        ranges,
                        references,
                    },
                );
            }
        }

        // References between definitions may point forward across files;
        // verify them only now that the whole registry exists.
        let known: BTreeSet<SupportIdent> = definitions.keys().cloned().collect();
        for definition in definitions.values_mut() {
            definition.references.retain(|reference| {
                let ok = known.contains(reference);
                if !ok {
                    pending_warnings.push(format!(
                        "supported-on '{}' references unknown definition '{reference}'",
                        definition.ident
                    ));
                }
                ok
            });
        }

        for warning in pending_warnings {
            self.warn(warning);
        }
        (products, definitions)
    }

    fn build_policies(
        &mut self,
        categories: &BTreeMap<CategoryIdent, Category>,
        support_definitions: &BTreeMap<SupportIdent, SupportedOnDefinition>,
    ) -> Result<BTreeMap<String, Policy>> {
        let mut policies: BTreeMap<String, Policy> = BTreeMap::new();
        let mut bare_names: BTreeMap<String, String> = BTreeMap::new();
        let mut pending_warnings = Vec::new();

        for ns_name in &self.order {
            let slot = &self.slots[ns_name];
            let prefix = &slot.source.raw.namespace.prefix;
            for raw in &slot.source.raw.policies {
                let prefixed = format!("{prefix}.{}", raw.name);
                if policies.contains_key(&prefixed) {
                    return Err(PolicyError::definition(
                        slot.source_name.clone(),
                        format!("prefixed name '{prefixed}' collides with an existing policy"),
                    ));
                }
                if let Some(other_ns) = bare_names.get(&raw.name) {
                    if other_ns != ns_name {
                        pending_warnings.push(format!(
                            "policy name '{}' exists in both '{other_ns}' and '{ns_name}'",
                            raw.name
                        ));
                    }
                } else {
                    bare_names.insert(raw.name.clone(), ns_name.clone());
                }

                let policy =
                    self.policy_from_raw(slot, ns_name, prefixed.clone(), raw, categories, support_definitions, &mut pending_warnings)?;
                policies.insert(prefixed, policy);
            }
        }

        for warning in pending_warnings {
            self.warn(warning);
        }
        Ok(policies)
    }

    #[allow(clippy::too_many_arguments)]
    fn policy_from_raw(
        &self,
        slot: &SourceSlot,
        ns_name: &str,
        prefixed: String,
        raw: &RawPolicy,
        categories: &BTreeMap<CategoryIdent, Category>,
        support_definitions: &BTreeMap<SupportIdent, SupportedOnDefinition>,
        pending_warnings: &mut Vec<String>,
    ) -> Result<Policy> {
        if (raw.enabled_value.is_some() || raw.disabled_value.is_some())
            && raw.value_name.is_none()
        {
            return Err(PolicyError::definition(
                slot.source_name.clone(),
                format!("policy '{prefixed}' declares sentinel values without a value_name"),
            ));
        }

        let category = raw.category.as_ref().and_then(|reference| {
            self.resolve_reference(slot, reference)
                .map(|(ns, name)| CategoryIdent::new(ns, name))
                .filter(|ident| categories.contains_key(ident))
        });
        let supported_on = raw.supported_on.as_ref().and_then(|reference| {
            let resolved = self
                .resolve_reference(slot, reference)
                .map(|(ns, name)| SupportIdent {
                    namespace: ns,
                    name,
                })
                .filter(|ident| support_definitions.contains_key(ident));
            if resolved.is_none() {
                pending_warnings.push(format!(
                    "{}: policy '{prefixed}' supported-on reference '{reference}' is unresolved",
                    slot.source_name
                ));
            }
            resolved
        });

        let mut elements = Vec::with_capacity(raw.elements.len());
        for raw_element in &raw.elements {
            elements.push(element_from_raw(raw_element, raw));
        }

        Ok(Policy {
            prefixed_name: prefixed,
            name: raw.name.clone(),
            namespace: ns_name.to_string(),
            class: class_from_raw(raw.class),
            display_key: raw.display_key.clone(),
            explain_key: raw.explain_key.clone(),
            key: raw.key.clone(),
            value_name: raw.value_name.clone(),
            category,
            supported_on,
            enabled_value: raw.enabled_value.clone(),
            disabled_value: raw.disabled_value.clone(),
            enabled_list: records_from_raw(&raw.enabled_list, &raw.key, raw.value_name.as_deref()),
            disabled_list: records_from_raw(
                &raw.disabled_list,
                &raw.key,
                raw.value_name.as_deref(),
            ),
            elements,
        })
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn source_label(source: &DefinitionSource) -> String {
    source
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| source.path.display().to_string())
}

fn class_from_raw(raw: RawClass) -> PolicyClass {
    match raw {
        RawClass::Machine => PolicyClass::Machine,
        RawClass::User => PolicyClass::User,
        RawClass::Both => PolicyClass::Both,
    }
}

fn version_from_raw(raw: &RawProductVersion) -> SupportedVersion {
    SupportedVersion {
        name: raw.name.clone(),
        display_key: raw.display_key.clone(),
        index: raw.index,
        minor_versions: raw.minor_versions.iter().map(minor_from_raw).collect(),
    }
}

fn minor_from_raw(raw: &crate::defs::model::RawMinorVersion) -> SupportedVersion {
    SupportedVersion {
        name: raw.name.clone(),
        display_key: raw.display_key.clone(),
        index: raw.index,
        minor_versions: Vec::new(),
    }
}

fn records_from_raw(
    raw: &[RawStoreRecord],
    default_key: &str,
    default_value_name: Option<&str>,
) -> Vec<StoreRecord> {
    raw.iter()
        .map(|record| StoreRecord {
            key: record.key.clone().unwrap_or_else(|| default_key.to_string()),
            value_name: record
                .value_name
                .clone()
                .or_else(|| default_value_name.map(str::to_string))
                .unwrap_or_default(),
            value: record.value.clone(),
        })
        .collect()
}

/// Apply the policy-level key and value-name defaults while lowering a raw
/// element into the codec type.
fn element_from_raw(raw: &RawElement, policy: &RawPolicy) -> PolicyElement {
    let default_key = policy.key.as_str();
    let default_value_name = policy.value_name.as_deref();
    let value_name_for = |explicit: &Option<String>, id: &str| {
        explicit
            .clone()
            .or_else(|| default_value_name.map(str::to_string))
            .unwrap_or_else(|| id.to_string())
    };
    let key_for =
        |explicit: &Option<String>| explicit.clone().unwrap_or_else(|| default_key.to_string());

    match raw {
        RawElement::Boolean {
            id,
            key,
            value_name,
            required,
            on_true,
            on_false,
        } => {
            let key = key_for(key);
            let value_name = value_name_for(value_name, id);
            let on_true = records_from_raw(on_true, &key, Some(&value_name));
            let on_false = records_from_raw(on_false, &key, Some(&value_name));
            PolicyElement::Boolean(BooleanElement {
                id: id.clone(),
                key,
                value_name,
                required: *required,
                on_true,
                on_false,
            })
        }
        RawElement::Decimal {
            id,
            key,
            value_name,
            required,
            min,
            max,
            store_as_text,
        } => PolicyElement::Decimal(DecimalElement {
            id: id.clone(),
            key: key_for(key),
            value_name: value_name_for(value_name, id),
            required: *required,
            min: *min,
            max: *max,
            store_as_text: *store_as_text,
        }),
        RawElement::LongDecimal {
            id,
            key,
            value_name,
            required,
            min,
            max,
            store_as_text,
        } => PolicyElement::LongDecimal(LongDecimalElement {
            id: id.clone(),
            key: key_for(key),
            value_name: value_name_for(value_name, id),
            required: *required,
            min: *min,
            max: *max,
            store_as_text: *store_as_text,
        }),
        RawElement::Text {
            id,
            key,
            value_name,
            required,
            max_length,
            expandable,
        } => PolicyElement::Text(TextElement {
            id: id.clone(),
            key: key_for(key),
            value_name: value_name_for(value_name, id),
            required: *required,
            max_length: *max_length,
            expandable: *expandable,
        }),
        RawElement::MultiText {
            id,
            key,
            value_name,
            required,
        } => PolicyElement::MultiText(MultiTextElement {
            id: id.clone(),
            key: key_for(key),
            value_name: value_name_for(value_name, id),
            required: *required,
        }),
        RawElement::Enum {
            id,
            key,
            value_name,
            required,
            items,
        } => {
            let key = key_for(key);
            let value_name = value_name_for(value_name, id);
            let items = items
                .iter()
                .map(|item| EnumItem {
                    id: item.id.clone(),
                    display_key: item.display_key.clone(),
                    value: item.value.clone(),
                    subvalues: records_from_raw(&item.subvalues, &key, Some(&value_name)),
                })
                .collect();
            PolicyElement::Enum(EnumElement {
                id: id.clone(),
                key,
                value_name,
                required: *required,
                items,
            })
        }
        RawElement::List {
            id,
            key,
            required,
            explicit_pairs,
        } => PolicyElement::List(ListElement {
            id: id.clone(),
            key: key.clone(),
            required: *required,
            explicit_pairs: *explicit_pairs,
        }),
    }
}
