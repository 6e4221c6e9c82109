//! Integration tests for appended attributes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use scout_wizard::{QueryKind, Record, RequestSnapshot, ScoutQueryWizard, WizardConfig, WizardError};
use scout_wizard_test_utils::TestBackend;

fn append_wizard(backend: &TestBackend, appends: &str) -> ScoutQueryWizard {
    let request =
        RequestSnapshot::from_query_str(&format!("append={appends}"), &WizardConfig::default());
    let search = backend.search("AppendModel").expect("failed to start search");
    ScoutQueryWizard::for_subject(search, request).expect("failed to create wizard")
}

fn assert_attribute_loaded(record: &Record, attribute: &str) {
    let json = record.to_json();
    assert!(
        json.get(attribute).is_some(),
        "the `{attribute}` attribute was expected but not loaded: {json}"
    );
}

// -------------------------------------------------------------------------
// Appending
// -------------------------------------------------------------------------

/// Test that appends are optional.
#[test]
fn does_not_require_appends() {
    let backend = TestBackend::seeded();
    let search = backend.search("AppendModel").unwrap();

    let records = ScoutQueryWizard::for_subject(search, RequestSnapshot::new())
        .unwrap()
        .set_allowed_appends(["fullname"])
        .build()
        .unwrap()
        .get()
        .unwrap();

    assert_eq!(records.len(), 2);
    assert!(records[0].to_json().get("fullname").is_none());
}

/// Test appending an attribute to a single record.
#[test]
fn appends_attributes() {
    let backend = TestBackend::seeded();

    let record = append_wizard(&backend, "fullname")
        .set_allowed_appends(["fullname"])
        .build()
        .unwrap()
        .first()
        .unwrap()
        .expect("no record");

    assert_attribute_loaded(&record, "fullname");
    assert_eq!(record.to_json()["fullname"], "John Doe");
}

/// Test that append names are case-sensitive.
#[test]
fn cannot_append_case_insensitive() {
    let backend = TestBackend::seeded();

    let result = append_wizard(&backend, "FullName")
        .set_allowed_appends(["fullname"])
        .build();

    assert!(matches!(result, Err(WizardError::InvalidAppendQuery { .. })));
}

/// Test appending to every record of a collection.
#[test]
fn appends_to_collections() {
    let backend = TestBackend::seeded();

    let records = append_wizard(&backend, "fullname")
        .set_allowed_appends(["fullname"])
        .build()
        .unwrap()
        .get()
        .unwrap();

    assert_eq!(records.len(), 2);
    for record in &records {
        assert_attribute_loaded(record, "fullname");
    }
}

/// Test appending to a length-aware page.
#[test]
fn appends_to_paginated_results() {
    let backend = TestBackend::seeded();

    let page = append_wizard(&backend, "fullname")
        .set_allowed_appends(["fullname"])
        .build()
        .unwrap()
        .paginate(15, 1)
        .unwrap();

    assert_eq!(page.total(), Some(2));
    assert!(!page.items().is_empty());
    for record in page.items() {
        assert_attribute_loaded(record, "fullname");
    }
}

/// Test appending to a simple page.
#[test]
fn appends_to_simple_paginated_results() {
    let backend = TestBackend::seeded();

    let page = append_wizard(&backend, "fullname")
        .set_allowed_appends(["fullname"])
        .build()
        .unwrap()
        .simple_paginate(1, 1)
        .unwrap();

    assert_eq!(page.total(), None);
    assert!(page.has_more_pages());
    assert_eq!(page.items().len(), 1);
    assert_attribute_loaded(&page.items()[0], "fullname");
}

/// Test that extra allowed appends do not need to be requested.
#[test]
fn allows_multiple_appends() {
    let backend = TestBackend::seeded();

    let record = append_wizard(&backend, "fullname")
        .set_allowed_appends(["fullname", "randomAttribute"])
        .build()
        .unwrap()
        .first()
        .unwrap()
        .expect("no record");

    assert_attribute_loaded(&record, "fullname");
    assert!(record.to_json().get("reversename").is_none());
}

/// Test appending several attributes at once.
#[test]
fn appends_multiple_attributes() {
    let backend = TestBackend::seeded();

    let query = append_wizard(&backend, "fullname,reversename")
        .set_allowed_appends(["fullname", "reversename"])
        .build()
        .unwrap();
    assert_eq!(query.appends(), ["fullname", "reversename"]);

    let record = query.first().unwrap().expect("no record");
    assert_eq!(record.to_json()["fullname"], "John Doe");
    assert_eq!(record.to_json()["reversename"], "Doe John");
}

/// Test that default appends apply when none were requested.
#[test]
fn uses_default_appends() {
    let backend = TestBackend::seeded();
    let search = backend.search("AppendModel").unwrap();

    let records = ScoutQueryWizard::for_subject(search, RequestSnapshot::new())
        .unwrap()
        .set_allowed_appends(["fullname", "reversename"])
        .set_default_appends(["reversename"])
        .build()
        .unwrap()
        .get()
        .unwrap();

    assert_eq!(records[1].to_json()["reversename"], "Roe Jane");
    assert!(records[1].to_json().get("fullname").is_none());
}

// -------------------------------------------------------------------------
// Validation
// -------------------------------------------------------------------------

/// Test that an append outside the allow-list is rejected.
#[test]
fn guards_against_invalid_appends() {
    let backend = TestBackend::seeded();

    let Err(err) = append_wizard(&backend, "random-attribute-to-append")
        .set_allowed_appends(["attribute-to-append"])
        .build()
    else {
        panic!("expected an invalid append error");
    };

    assert_eq!(err.kind(), Some(QueryKind::Append));
    assert_eq!(err.unknown(), ["random-attribute-to-append"]);
    assert_eq!(err.allowed(), ["attribute-to-append"]);
}

/// Test that the error carries the unknown and allowed appends.
#[test]
fn invalid_append_error_contains_unknown_and_allowed_appends() {
    let err = WizardError::invalid(
        QueryKind::Append,
        vec!["not allowed append".to_string()],
        vec!["allowed append".to_string()],
    );

    assert_eq!(err.unknown(), ["not allowed append"]);
    assert_eq!(err.allowed(), ["allowed append"]);
}

/// Test that an allowed append without an accessor fails on the results.
#[test]
fn allowed_append_without_accessor_fails_on_results() {
    let backend = TestBackend::seeded();

    let query = append_wizard(&backend, "randomAttribute")
        .set_allowed_appends(["randomAttribute"])
        .build()
        .unwrap();

    assert!(matches!(query.get(), Err(WizardError::Query(_))));
}
