#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests for the Chess Arena client.
//!
//! These tests parse `Cargo.toml` and fail when the panic-free lint set, the
//! feature layout, or the demo targets drift from the agreed-upon policy.

use std::path::PathBuf;

fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn manifest() -> toml::Table {
    let path = project_root().join("Cargo.toml");
    let raw = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read '{}': {e}", path.display()));
    toml::from_str(&raw).expect("Cargo.toml must parse")
}

fn table<'a>(value: &'a toml::Table, key: &str) -> &'a toml::Table {
    value
        .get(key)
        .and_then(toml::Value::as_table)
        .unwrap_or_else(|| panic!("Cargo.toml is missing the [{key}] table"))
}

// ── Lints ───────────────────────────────────────────────────────────

mod lint_policy {
    use super::*;

    const REQUIRED_DENY_LINTS: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn cargo_toml_has_all_panic_free_lints() {
        let manifest = manifest();
        let clippy = table(table(&manifest, "lints"), "clippy");

        for lint in REQUIRED_DENY_LINTS {
            assert_eq!(
                clippy.get(*lint).and_then(toml::Value::as_str),
                Some("deny"),
                "Cargo.toml must set `{lint} = \"deny\"` in [lints.clippy] to \
                 keep library code panic-free."
            );
        }
    }
}

// ── Features ────────────────────────────────────────────────────────

mod feature_policy {
    use super::*;

    fn feature_list(manifest: &toml::Table, name: &str) -> Vec<String> {
        table(manifest, "features")
            .get(name)
            .and_then(toml::Value::as_array)
            .unwrap_or_else(|| panic!("feature `{name}` is not declared"))
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect()
    }

    #[test]
    fn default_features_enable_websocket_and_auth() {
        let defaults = feature_list(&manifest(), "default");
        assert!(defaults.contains(&"transport-websocket".to_owned()));
        assert!(defaults.contains(&"http-auth".to_owned()));
    }

    #[test]
    fn optional_stacks_are_gated_behind_features() {
        let manifest = manifest();
        let deps = table(&manifest, "dependencies");
        for name in ["tokio-tungstenite", "futures-util", "reqwest"] {
            let optional = deps
                .get(name)
                .and_then(toml::Value::as_table)
                .and_then(|t| t.get("optional"))
                .and_then(toml::Value::as_bool);
            assert_eq!(optional, Some(true), "`{name}` must be optional");
        }

        assert!(feature_list(&manifest, "http-auth").contains(&"dep:reqwest".to_owned()));
        assert!(feature_list(&manifest, "transport-websocket")
            .contains(&"dep:tokio-tungstenite".to_owned()));
    }

    #[test]
    fn reqwest_keeps_cookie_support() {
        let manifest = manifest();
        let features: Vec<&str> = table(&manifest, "dependencies")
            .get("reqwest")
            .and_then(toml::Value::as_table)
            .and_then(|t| t.get("features"))
            .and_then(toml::Value::as_array)
            .expect("reqwest must list its features")
            .iter()
            .filter_map(toml::Value::as_str)
            .collect();
        assert!(features.contains(&"cookies"));
        assert!(features.contains(&"json"));
    }
}

// ── Demos ───────────────────────────────────────────────────────────

mod demo_policy {
    use super::*;

    #[test]
    fn every_demo_target_points_at_an_existing_file() {
        let manifest = manifest();
        let targets = manifest
            .get("example")
            .and_then(toml::Value::as_array)
            .expect("Cargo.toml must declare [[example]] targets");
        assert!(!targets.is_empty());

        for target in targets {
            let path = target
                .get("path")
                .and_then(toml::Value::as_str)
                .expect("every [[example]] needs an explicit path");
            assert!(
                project_root().join(path).is_file(),
                "demo target '{path}' does not exist"
            );
        }
    }
}
