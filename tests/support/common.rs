#![allow(dead_code)]

// Fixture definition folders for the integration tests: two namespaces with
// a cross-namespace category parent, localized resource files, and one
// policy per element shape the codec supports.

use anyhow::Result;
use policyctl::PolicyCatalog;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub fn corp_definitions() -> Value {
    json!({
        "schema_version": "policy_defs_v1",
        "namespace": {"name": "Corp.Policies.System", "prefix": "corp"},
        "supported_on": {
            "products": [{
                "name": "server",
                "display_key": "product_server",
                "index": 1,
                "major_versions": [
                    {"name": "v1", "display_key": "server_v1", "index": 1},
                    {"name": "v2", "display_key": "server_v2", "index": 2}
                ]
            }],
            "definitions": [{
                "name": "at_least_v2",
                "display_key": "supported_v2",
                "ranges": [{"product": "server", "min_version": 2}]
            }]
        },
        "categories": [
            {"name": "system", "display_key": "cat_system"},
            {"name": "diagnostics", "display_key": "cat_diagnostics", "parent": "system"}
        ],
        "policies": [
            {
                "name": "telemetry",
                "class": "machine",
                "display_key": "telemetry_name",
                "explain_key": "telemetry_explain",
                "key": "Software/Corp/System",
                "value_name": "Telemetry",
                "category": "diagnostics",
                "supported_on": "at_least_v2",
                "elements": [
                    {"type": "decimal", "id": "level", "required": true, "min": 2, "max": 10},
                    {"type": "boolean", "id": "verbose", "value_name": "Verbose"}
                ]
            },
            {
                "name": "banner",
                "class": "user",
                "display_key": "banner_name",
                "key": "Software/Corp/Desktop",
                "value_name": "Banner",
                "category": "system",
                "elements": [
                    {"type": "text", "id": "message", "value_name": "Message", "required": true, "max_length": 64},
                    {"type": "multi_text", "id": "lines", "value_name": "Lines"}
                ]
            },
            {
                "name": "audit",
                "class": "both",
                "display_key": "audit_name",
                "key": "Software/Corp/Audit",
                "value_name": "Audit",
                "category": "system"
            },
            {
                "name": "proxy",
                "class": "machine",
                "display_key": "proxy_name",
                "key": "Software/Corp/Proxy",
                "value_name": "Proxy",
                "category": "system",
                "elements": [
                    {
                        "type": "enum",
                        "id": "mode",
                        "value_name": "Mode",
                        "required": true,
                        "items": [
                            {"id": "off", "display_key": "mode_off", "value": {"kind": "u32", "data": 0}},
                            {
                                "id": "manual",
                                "display_key": "mode_manual",
                                "value": {"kind": "u32", "data": 2},
                                "subvalues": [
                                    {"value_name": "ManualMarker", "value": {"kind": "u32", "data": 1}}
                                ]
                            }
                        ]
                    },
                    {"type": "list", "id": "servers", "key": "Software/Corp/Proxy/Servers"},
                    {
                        "type": "list",
                        "id": "overrides",
                        "key": "Software/Corp/Proxy/Overrides",
                        "explicit_pairs": true
                    }
                ]
            }
        ]
    })
}

pub fn net_definitions() -> Value {
    json!({
        "schema_version": "policy_defs_v1",
        "namespace": {"name": "Corp.Policies.Network", "prefix": "net"},
        "using": [{"name": "Corp.Policies.System", "prefix": "sys"}],
        "categories": [
            {"name": "network", "display_key": "cat_network", "parent": "sys:system"},
            {"name": "stray", "display_key": "cat_stray", "parent": "sys:missing"}
        ],
        "policies": [
            {
                "name": "firewall",
                "class": "machine",
                "display_key": "firewall_name",
                "key": "Software/Corp/Network",
                "value_name": "Firewall",
                "category": "network",
                "supported_on": "sys:at_least_v2",
                "enabled_list": [
                    {"value_name": "LogAllowed", "value": {"kind": "u32", "data": 1}},
                    {"value_name": "LogBlocked", "value": {"kind": "u32", "data": 1}}
                ],
                "disabled_list": [
                    {"value_name": "LogAllowed", "value": {"kind": "u32", "data": 0}}
                ]
            }
        ]
    })
}

pub fn corp_strings(locale: &str) -> Value {
    let strings = match locale {
        "fr" => json!({
            "telemetry_name": "Niveau de télémétrie",
            "cat_system": "Système"
        }),
        _ => json!({
            "cat_system": "System",
            "cat_diagnostics": "Diagnostics",
            "telemetry_name": "Telemetry level",
            "telemetry_explain": "Controls how much diagnostic data is reported.",
            "banner_name": "Desktop banner",
            "audit_name": "Audit trail",
            "proxy_name": "Proxy settings",
            "mode_off": "Off",
            "mode_manual": "Manual",
            "product_server": "Corp Server",
            "server_v1": "Corp Server v1",
            "server_v2": "Corp Server v2",
            "supported_v2": "Corp Server v2 or later"
        }),
    };
    json!({
        "schema_version": "policy_strings_v1",
        "locale": locale,
        "strings": strings,
    })
}

pub fn net_strings(locale: &str) -> Value {
    let strings = match locale {
        "fr" => json!({"firewall_name": "Pare-feu"}),
        _ => json!({"cat_network": "Network", "cat_stray": "Stray", "firewall_name": "Firewall"}),
    };
    json!({
        "schema_version": "policy_strings_v1",
        "locale": locale,
        "strings": strings,
    })
}

pub fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Standard two-namespace fixture folder with en-US and fr resources.
pub fn write_fixture_folder(base: &Path) -> Result<()> {
    write_json(&base.join("corp.policies.json"), &corp_definitions())?;
    write_json(&base.join("net.policies.json"), &net_definitions())?;
    write_json(&base.join("en-US/corp.strings.json"), &corp_strings("en-US"))?;
    write_json(&base.join("en-US/net.strings.json"), &net_strings("en-US"))?;
    write_json(&base.join("fr/corp.strings.json"), &corp_strings("fr"))?;
    write_json(&base.join("fr/net.strings.json"), &net_strings("fr"))?;
    Ok(())
}

pub fn fixture_catalog(locale: &str) -> Result<(TempDir, PolicyCatalog)> {
    let dir = TempDir::new()?;
    write_fixture_folder(dir.path())?;
    let catalog = PolicyCatalog::load(dir.path(), locale)?;
    Ok((dir, catalog))
}
