// Catalog construction guard rails: two-phase resolution, identity
// invariants, and category-tree shape.

#[path = "support/common.rs"]
mod common;

use anyhow::Result;
use policyctl::{CategoryIdent, PolicyCatalog, PolicyClass, PolicyError};
use serde_json::json;
use tempfile::TempDir;

use common::{corp_definitions, fixture_catalog, write_fixture_folder, write_json};

#[test]
fn resolve_round_trips_every_policy() -> Result<()> {
    let (_dir, catalog) = fixture_catalog("en-US")?;
    assert_eq!(catalog.len(), 5);
    for policy in catalog.policies() {
        let resolved = catalog.resolve(&policy.prefixed_name)?;
        assert_eq!(resolved.prefixed_name, policy.prefixed_name);
        assert_eq!(resolved.key, policy.key);
    }
    Ok(())
}

#[test]
fn unknown_prefixed_name_is_not_found() -> Result<()> {
    let (_dir, catalog) = fixture_catalog("en-US")?;
    assert!(matches!(
        catalog.resolve("corp.absent"),
        Err(PolicyError::NotFound { .. })
    ));
    Ok(())
}

#[test]
fn cross_namespace_parent_resolves_after_all_files_load() -> Result<()> {
    let (_dir, catalog) = fixture_catalog("en-US")?;
    let system = catalog.category(&CategoryIdent::new("Corp.Policies.System", "system"))?;
    let network_ident = CategoryIdent::new("Corp.Policies.Network", "network");
    assert!(system.children.contains(&network_ident));
    let network = catalog.category(&network_ident)?;
    assert_eq!(network.parent.as_ref(), Some(&system.ident));
    assert!(!network.orphaned);
    Ok(())
}

#[test]
fn unresolved_parent_attaches_under_root_as_orphan() -> Result<()> {
    let (_dir, catalog) = fixture_catalog("en-US")?;
    let stray_ident = CategoryIdent::new("Corp.Policies.Network", "stray");
    let stray = catalog.category(&stray_ident)?;
    assert!(stray.orphaned);
    assert!(stray.parent.is_none());
    assert!(catalog.root_categories().contains(&stray_ident));
    assert!(
        catalog
            .warnings()
            .iter()
            .any(|w| w.contains("stray") && w.contains("unresolved"))
    );
    Ok(())
}

#[test]
fn children_and_policies_keep_declaration_order() -> Result<()> {
    let (_dir, catalog) = fixture_catalog("en-US")?;
    let system = catalog.category(&CategoryIdent::new("Corp.Policies.System", "system"))?;
    assert_eq!(
        system.policies,
        vec!["corp.banner", "corp.audit", "corp.proxy"]
    );
    Ok(())
}

#[test]
fn missing_mandatory_namespace_fails_the_build() -> Result<()> {
    let dir = TempDir::new()?;
    // net requires Corp.Policies.System, which is not on disk
    write_json(
        &dir.path().join("net.policies.json"),
        &common::net_definitions(),
    )?;
    match PolicyCatalog::load(dir.path(), "en-US") {
        Err(PolicyError::Definition { message, .. }) => {
            assert!(message.contains("Corp.Policies.System"));
        }
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("expected definition error"),
    }
    Ok(())
}

#[test]
fn duplicate_namespace_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    write_json(&dir.path().join("corp.policies.json"), &corp_definitions())?;
    write_json(&dir.path().join("copy.policies.json"), &corp_definitions())?;
    match PolicyCatalog::load(dir.path(), "en-US") {
        Err(PolicyError::Definition { message, .. }) => {
            assert!(message.contains("already declared"));
        }
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("expected definition error"),
    }
    Ok(())
}

#[test]
fn duplicate_policy_in_one_file_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    let defs = json!({
        "schema_version": "policy_defs_v1",
        "namespace": {"name": "Dup.Ns", "prefix": "dup"},
        "policies": [
            {"name": "same", "class": "machine", "display_key": "k", "key": "Software/Dup"},
            {"name": "same", "class": "user", "display_key": "k", "key": "Software/Dup"}
        ]
    });
    write_json(&dir.path().join("dup.policies.json"), &defs)?;
    assert!(matches!(
        PolicyCatalog::load(dir.path(), "en-US"),
        Err(PolicyError::Definition { .. })
    ));
    Ok(())
}

#[test]
fn inverted_numeric_bounds_are_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    let defs = json!({
        "schema_version": "policy_defs_v1",
        "namespace": {"name": "Bad.Bounds", "prefix": "bad"},
        "policies": [{
            "name": "p",
            "class": "machine",
            "display_key": "k",
            "key": "Software/Bad",
            "value_name": "V",
            "elements": [{"type": "decimal", "id": "d", "min": 9, "max": 3}]
        }]
    });
    write_json(&dir.path().join("bad.policies.json"), &defs)?;
    match PolicyCatalog::load(dir.path(), "en-US") {
        Err(PolicyError::Definition { message, .. }) => {
            assert!(message.contains("min 9 > max 3"));
        }
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("expected definition error"),
    }
    Ok(())
}

#[test]
fn malformed_file_fails_schema_validation() -> Result<()> {
    let dir = TempDir::new()?;
    // class is not one of machine/user/both
    let defs = json!({
        "schema_version": "policy_defs_v1",
        "namespace": {"name": "Bad.Class", "prefix": "bad"},
        "policies": [{"name": "p", "class": "galaxy", "display_key": "k", "key": "Software/Bad"}]
    });
    write_json(&dir.path().join("bad.policies.json"), &defs)?;
    match PolicyCatalog::load(dir.path(), "en-US") {
        Err(PolicyError::Definition { message, .. }) => {
            assert!(message.contains("schema validation failed"));
        }
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("expected definition error"),
    }
    Ok(())
}

#[test]
fn bare_name_collision_across_namespaces_is_only_a_warning() -> Result<()> {
    let dir = TempDir::new()?;
    write_fixture_folder(dir.path())?;
    let extra = json!({
        "schema_version": "policy_defs_v1",
        "namespace": {"name": "Other.Ns", "prefix": "other"},
        "policies": [
            {"name": "telemetry", "class": "machine", "display_key": "k", "key": "Software/Other"}
        ]
    });
    write_json(&dir.path().join("other.policies.json"), &extra)?;
    let catalog = PolicyCatalog::load(dir.path(), "en-US")?;
    assert!(catalog.resolve("other.telemetry").is_ok());
    assert!(catalog.resolve("corp.telemetry").is_ok());
    assert!(
        catalog
            .warnings()
            .iter()
            .any(|w| w.contains("'telemetry'") && w.contains("both"))
    );
    Ok(())
}

#[test]
fn supported_on_references_resolve_across_namespaces() -> Result<()> {
    let (_dir, catalog) = fixture_catalog("en-US")?;

    let telemetry = catalog.resolve("corp.telemetry")?;
    let ident = telemetry.supported_on.as_ref().expect("reference kept");
    let definition = catalog.support_definition(ident)?;
    assert_eq!(definition.ranges.len(), 1);
    assert_eq!(definition.ranges[0].min_version, Some(2));
    assert_eq!(
        catalog.support_display(definition).text,
        "Corp Server v2 or later"
    );

    // firewall points at the same definition through the sys: prefix
    let firewall = catalog.resolve("net.firewall")?;
    assert_eq!(firewall.supported_on.as_ref(), Some(ident));

    let product = catalog.products().next().expect("product registered");
    assert_eq!(product.index, 1);
    assert_eq!(product.major_versions.len(), 2);
    Ok(())
}

#[test]
fn classes_and_elements_survive_the_build() -> Result<()> {
    let (_dir, catalog) = fixture_catalog("en-US")?;
    let telemetry = catalog.resolve("corp.telemetry")?;
    assert_eq!(telemetry.class, PolicyClass::Machine);
    assert_eq!(telemetry.elements.len(), 2);
    // element without its own key inherits the policy's
    assert_eq!(telemetry.elements[0].key(), "Software/Corp/System");

    let audit = catalog.resolve("corp.audit")?;
    assert_eq!(audit.class, PolicyClass::Both);
    assert!(audit.elements.is_empty());
    Ok(())
}
