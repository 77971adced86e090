//! Tests for Name and NamePattern
//!
//! These tests verify:
//! - Defaults and normalization
//! - Rejection of malformed names
//! - The name ↔ path mapping (property-tested)
//! - Pattern matching

use std::path::PathBuf;

use layerstore::name::{DEFAULT_HOST, DEFAULT_NAMESPACE, DEFAULT_TAG};
use layerstore::{Name, NamePattern, StoreError};
use proptest::prelude::*;

// =============================================================================
// Parsing Tests
// =============================================================================

#[test]
fn test_defaults_fill_missing_parts() {
    let name = Name::parse("test").unwrap();

    assert_eq!(name.host(), DEFAULT_HOST);
    assert_eq!(name.namespace(), DEFAULT_NAMESPACE);
    assert_eq!(name.model(), "test");
    assert_eq!(name.tag(), DEFAULT_TAG);
    assert_eq!(name.to_string(), "registry.ollama.ai/library/test:latest");
}

#[test]
fn test_explicit_parts() {
    let name = Name::parse("example.com:5000/team/model:v1.2").unwrap();

    assert_eq!(name.host(), "example.com:5000");
    assert_eq!(name.namespace(), "team");
    assert_eq!(name.model(), "model");
    assert_eq!(name.tag(), "v1.2");
}

#[test]
fn test_parts_are_case_insensitive() {
    assert_eq!(
        Name::parse("Library/TEST:Latest").unwrap(),
        Name::parse("library/test:latest").unwrap()
    );
    assert_eq!(Name::parse("Test").unwrap(), Name::parse("test").unwrap());
}

#[test]
fn test_display_shortest() {
    let cases = [
        ("test", "test"),
        ("test:latest", "test"),
        ("test:v1", "test:v1"),
        ("ns/test:v1", "ns/test:v1"),
        ("example.com/library/model", "example.com/library/model"),
    ];

    for (input, expected) in cases {
        let name = Name::parse(input).unwrap();
        assert_eq!(name.display_shortest(), expected);
        assert_eq!(Name::parse(&name.display_shortest()).unwrap(), name);
    }
}

#[test]
fn test_invalid_names() {
    let too_long_model = "m".repeat(81);
    let too_long_host = format!("{}/ns/model", "h".repeat(351));
    let invalid = [
        "",
        "a/b/c/d",
        "test@sha256:abc",
        "test:",
        "/test",
        ".hidden",
        "..",
        "ns/..",
        "te%st",
        "a b",
        "-dash",
        too_long_model.as_str(),
        too_long_host.as_str(),
    ];

    for input in invalid {
        let err = Name::parse(input).unwrap_err();
        assert!(
            matches!(err, StoreError::InvalidName(_)),
            "{input:?} should be rejected, got {err:?}"
        );
    }
}

#[test]
fn test_length_limits_are_inclusive() {
    assert!(Name::parse(&"m".repeat(80)).is_ok());
    assert!(Name::parse(&format!("{}/ns/model", "h".repeat(350))).is_ok());
}

// =============================================================================
// Path Mapping Tests
// =============================================================================

#[test]
fn test_filepath_layout() {
    let name = Name::parse("localhost:5000/team/model:v1").unwrap();

    assert_eq!(
        name.filepath(),
        ["localhost%5000", "team", "model", "v1"].iter().collect::<PathBuf>()
    );
}

#[test]
fn test_from_path_components_requires_normalized_form() {
    assert_eq!(
        Name::from_path_components(["localhost%5000", "team", "model", "v1"]),
        Some(Name::parse("localhost:5000/team/model:v1").unwrap())
    );
    assert_eq!(Name::from_path_components(["Registry.ollama.ai", "library", "test", "latest"]), None);
    assert_eq!(Name::from_path_components(["localhost:5000", "team", "model", "v1"]), None);
    assert_eq!(Name::from_path_components(["registry.ollama.ai", "library", "test", ".partial-x"]), None);
}

// =============================================================================
// Pattern Tests
// =============================================================================

#[test]
fn test_pattern_any_matches_everything() {
    let any = NamePattern::parse("*/*/*:*").unwrap();

    for input in ["test", "ns/test:v1", "localhost:5000/team/model"] {
        let name = Name::parse(input).unwrap();
        assert!(any.matches(&name));
        assert!(NamePattern::any().matches(&name));
    }
}

#[test]
fn test_pattern_uses_name_defaults() {
    let pattern = NamePattern::parse("test*").unwrap();

    assert!(pattern.matches(&Name::parse("test").unwrap()));
    assert!(pattern.matches(&Name::parse("test2").unwrap()));
    assert!(!pattern.matches(&Name::parse("test:v1").unwrap()));
    assert!(!pattern.matches(&Name::parse("ns/test").unwrap()));
    assert_eq!(pattern.to_string(), "registry.ollama.ai/library/test*:latest");
}

#[test]
fn test_pattern_is_case_insensitive() {
    let pattern = NamePattern::parse("TEST?").unwrap();

    assert!(pattern.matches(&Name::parse("test2").unwrap()));
}

#[test]
fn test_invalid_pattern() {
    assert!(matches!(NamePattern::parse("te%st*"), Err(StoreError::InvalidName(_))));
    assert!(matches!(NamePattern::parse("a/b/c/d"), Err(StoreError::InvalidName(_))));
}

// =============================================================================
// Property Tests
// =============================================================================

fn part() -> impl Strategy<Value = String> {
    "[a-z0-9_][a-z0-9_.-]{0,15}"
}

fn host() -> impl Strategy<Value = String> {
    "[a-z0-9_][a-z0-9_.-]{0,15}(:[0-9]{1,5})?"
}

fn any_name() -> impl Strategy<Value = Name> {
    (host(), part(), part(), part()).prop_map(|(h, n, m, t)| Name::from_parts(&h, &n, &m, &t).unwrap())
}

proptest! {
    #[test]
    fn prop_path_round_trip(name in any_name()) {
        let components = name.path_components();
        let refs = [
            components[0].as_str(),
            components[1].as_str(),
            components[2].as_str(),
            components[3].as_str(),
        ];

        prop_assert_eq!(Name::from_path_components(refs), Some(name.clone()));
        prop_assert!(!components[0].contains(':'));
    }

    #[test]
    fn prop_display_round_trip(name in any_name()) {
        prop_assert_eq!(Name::parse(&name.to_string()).unwrap(), name.clone());
        prop_assert_eq!(Name::parse(&name.display_shortest()).unwrap(), name);
    }

    #[test]
    fn prop_distinct_names_have_distinct_paths(a in any_name(), b in any_name()) {
        prop_assert_eq!(a == b, a.filepath() == b.filepath());
    }

    #[test]
    fn prop_normalization_is_stable(name in any_name()) {
        let upper = name.to_string().to_uppercase();
        prop_assert_eq!(Name::parse(&upper).unwrap(), name);
    }
}
