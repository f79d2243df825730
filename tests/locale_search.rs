// Locale fallback and search behavior over a loaded catalog.

#[path = "support/common.rs"]
mod common;

use anyhow::Result;
use policyctl::search::{PreparedSearch, search};
use policyctl::{Policy, PolicyCatalog};

use common::fixture_catalog;

#[test]
fn fr_fr_falls_back_to_fr_then_default_without_error() -> Result<()> {
    // only fr and en-US folders exist on disk
    let (_dir, catalog) = fixture_catalog("fr-FR")?;

    let telemetry = catalog.resolve("corp.telemetry")?;
    let display = catalog.display_name(telemetry);
    assert!(display.resolved);
    assert_eq!(display.text, "Niveau de télémétrie");

    // fr has no banner_name; the default locale supplies it
    let banner = catalog.resolve("corp.banner")?;
    let display = catalog.display_name(banner);
    assert!(display.resolved);
    assert_eq!(display.text, "Desktop banner");
    Ok(())
}

#[test]
fn locale_with_no_resources_still_resolves_through_default() -> Result<()> {
    let (dir, _) = fixture_catalog("en-US")?;
    let catalog = PolicyCatalog::load(dir.path(), "zu")?;
    let audit = catalog.resolve("corp.audit")?;
    let display = catalog.display_name(audit);
    assert!(display.resolved);
    assert_eq!(display.text, "Audit trail");
    Ok(())
}

#[test]
fn locale_switch_rebuilds_strings_not_definitions() -> Result<()> {
    let (_dir, catalog) = fixture_catalog("en-US")?;
    let telemetry = catalog.resolve("corp.telemetry")?;
    assert_eq!(catalog.display_name(telemetry).text, "Telemetry level");

    catalog.set_locale("fr");
    assert_eq!(catalog.locale(), "fr");
    let telemetry = catalog.resolve("corp.telemetry")?;
    assert_eq!(
        catalog.display_name(telemetry).text,
        "Niveau de télémétrie"
    );
    Ok(())
}

fn project(catalog: &PolicyCatalog, policy: &Policy) -> String {
    format!(
        "{} {}",
        policy.prefixed_name,
        catalog.display_name(policy).text
    )
}

#[test]
fn search_requires_every_token() -> Result<()> {
    let (_dir, catalog) = fixture_catalog("en-US")?;
    let policies: Vec<&Policy> = catalog.policies().collect();

    let hits = search(
        &policies,
        |p: &&Policy| project(&catalog, p),
        "corp telemetry",
        ' ',
    );
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].prefixed_name, "corp.telemetry");

    // one token misses -> no result
    let hits = search(
        &policies,
        |p: &&Policy| project(&catalog, p),
        "corp nonexistent",
        ' ',
    );
    assert!(hits.is_empty());

    // case-insensitive substrings
    let hits = search(
        &policies,
        |p: &&Policy| project(&catalog, p),
        "TELEMETRY Level",
        ' ',
    );
    assert_eq!(hits.len(), 1);
    Ok(())
}

#[test]
fn empty_query_returns_all_in_catalog_order() -> Result<()> {
    let (_dir, catalog) = fixture_catalog("en-US")?;
    let policies: Vec<&Policy> = catalog.policies().collect();

    let hits = search(&policies, |p: &&Policy| project(&catalog, p), "", ' ');
    assert_eq!(hits.len(), policies.len());
    let names: Vec<&str> = hits.iter().map(|p| p.prefixed_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "corp.audit",
            "corp.banner",
            "corp.proxy",
            "corp.telemetry",
            "net.firewall"
        ]
    );
    Ok(())
}

#[test]
fn both_search_strategies_return_identical_results() -> Result<()> {
    let (_dir, catalog) = fixture_catalog("en-US")?;
    let policies: Vec<&Policy> = catalog.policies().collect();

    let prepared = PreparedSearch::new(&policies, |p: &&Policy| project(&catalog, p));
    for query in ["", "corp", "proxy settings", "FIREWALL", "a e", "zzz"] {
        let scanned: Vec<&str> = search(&policies, |p: &&Policy| project(&catalog, p), query, ' ')
            .into_iter()
            .map(|p| p.prefixed_name.as_str())
            .collect();
        let indexed: Vec<&str> = prepared
            .query(query, ' ')
            .into_iter()
            .map(|p| p.prefixed_name.as_str())
            .collect();
        assert_eq!(scanned, indexed, "query {query:?}");
    }
    Ok(())
}
