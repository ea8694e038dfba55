//! Assertion helpers.

use dicom_persistence::error::{QueryError, ResourceError, StorageError};
use dicom_persistence::types::VersionedInstanceIdentifier;

/// Asserts the SOP Instance UIDs of `identifiers`, in order.
pub fn assert_sops(identifiers: &[VersionedInstanceIdentifier], expected: &[&str]) {
    let actual: Vec<&str> = identifiers
        .iter()
        .map(|id| id.sop_instance_uid.as_str())
        .collect();
    assert_eq!(actual, expected, "SOP Instance UID mismatch");
}

/// Asserts that the error is an unsupported condition for `backend`.
pub fn assert_unsupported(err: &StorageError, backend: &str) {
    match err {
        StorageError::Query(QueryError::UnsupportedCondition { backend: b, .. }) => {
            assert_eq!(b, backend, "Unexpected backend in {err}")
        }
        other => panic!("Expected UnsupportedCondition, got {other:?}"),
    }
}

/// Asserts an exactly-one violation with the given match count.
pub fn assert_expected_exactly_one(err: &StorageError, expected_found: usize) {
    match err {
        StorageError::Resource(ResourceError::ExpectedExactlyOne { found, .. }) => {
            assert_eq!(*found, expected_found, "Unexpected match count in {err}")
        }
        other => panic!("Expected ExpectedExactlyOne, got {other:?}"),
    }
}
