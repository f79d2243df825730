//! Indexed, immutable view of a loaded policy catalog.
//!
//! `PolicyCatalog::load` is the composition root: folder scan, two-phase
//! merge/resolve, and locale-resolver wiring. Everything exposed here is
//! read-only; the locale cache inside the resolver is the only mutable state
//! and is safe to share.

use crate::catalog::build::{BuiltCatalog, CatalogBuilder};
use crate::catalog::model::{
    Category, CategoryIdent, Namespace, Policy, SupportIdent, SupportedOnDefinition,
    SupportedProduct,
};
use crate::defs::loader::load_definition_folder;
use crate::error::{EntityKind, PolicyError, Result};
use crate::locale::{DisplayString, LocaleResolver};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

pub struct PolicyCatalog {
    namespaces: BTreeMap<String, Namespace>,
    policies: BTreeMap<String, Policy>,
    categories: BTreeMap<CategoryIdent, Category>,
    root: Vec<CategoryIdent>,
    products: BTreeMap<SupportIdent, SupportedProduct>,
    support_definitions: BTreeMap<SupportIdent, SupportedOnDefinition>,
    warnings: Vec<String>,
    strings: LocaleResolver,
}

impl PolicyCatalog {
    /// Scan `base`, merge every definition file, resolve all references, and
    /// wire up string resolution for `locale`.
    pub fn load(base: &Path, locale: &str) -> Result<Self> {
        let loaded = load_definition_folder(base)?;
        let mut builder = CatalogBuilder::new();
        for source in loaded.sources {
            builder.register(source)?;
        }
        let built = builder.build()?;
        let stems = built
            .namespaces
            .iter()
            .map(|(name, ns)| (name.clone(), ns.stem.clone()))
            .collect();
        let strings = LocaleResolver::new(loaded.base_dir, stems, locale);
        debug!(
            policies = built.policies.len(),
            categories = built.categories.len(),
            warnings = built.warnings.len(),
            "catalog built"
        );
        Ok(Self::from_built(built, strings))
    }

    pub fn from_built(built: BuiltCatalog, strings: LocaleResolver) -> Self {
        Self {
            namespaces: built.namespaces,
            policies: built.policies,
            categories: built.categories,
            root: built.root,
            products: built.products,
            support_definitions: built.support_definitions,
            warnings: built.warnings,
            strings,
        }
    }

    /// Look up a policy by its catalog-wide prefixed name.
    pub fn resolve(&self, prefixed_name: &str) -> Result<&Policy> {
        self.policies
            .get(prefixed_name)
            .ok_or_else(|| PolicyError::not_found(EntityKind::Policy, prefixed_name))
    }

    /// Policies in stable catalog order (lexicographic by prefixed name).
    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn category(&self, ident: &CategoryIdent) -> Result<&Category> {
        self.categories
            .get(ident)
            .ok_or_else(|| PolicyError::not_found(EntityKind::Category, ident.to_string()))
    }

    /// Top-level categories under the synthetic root, declaration order with
    /// orphans appended.
    pub fn root_categories(&self) -> &[CategoryIdent] {
        &self.root
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.values()
    }

    pub fn products(&self) -> impl Iterator<Item = &SupportedProduct> {
        self.products.values()
    }

    pub fn support_definition(&self, ident: &SupportIdent) -> Result<&SupportedOnDefinition> {
        self.support_definitions
            .get(ident)
            .ok_or_else(|| PolicyError::not_found(EntityKind::SupportedOn, ident.to_string()))
    }

    /// Non-fatal findings recorded during the build.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    // Display strings go through the locale resolver; the catalog only knows
    // which namespace owns which key.

    pub fn display_name(&self, policy: &Policy) -> DisplayString {
        self.strings.resolve(&policy.namespace, &policy.display_key)
    }

    pub fn explain(&self, policy: &Policy) -> Option<DisplayString> {
        policy
            .explain_key
            .as_ref()
            .map(|key| self.strings.resolve(&policy.namespace, key))
    }

    pub fn category_display(&self, category: &Category) -> DisplayString {
        self.strings
            .resolve(&category.ident.namespace, &category.display_key)
    }

    pub fn support_display(&self, definition: &SupportedOnDefinition) -> DisplayString {
        self.strings
            .resolve(&definition.ident.namespace, &definition.display_key)
    }

    pub fn locale(&self) -> String {
        self.strings.locale()
    }

    pub fn set_locale(&self, locale: &str) {
        self.strings.set_locale(locale);
    }
}
