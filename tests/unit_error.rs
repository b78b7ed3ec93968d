use std::path::PathBuf;

use shelf::error::{exit_codes, Error, JsonError};
use shelf::model::Level;

#[test]
fn exit_codes_map_correctly() {
    let user = Error::InvalidArgument("bad".to_string());
    assert_eq!(user.exit_code(), exit_codes::USER_ERROR);

    let index = Error::InvalidIndex { index: 3, len: 3 };
    assert_eq!(index.exit_code(), exit_codes::USER_ERROR);

    let storage = Error::StorageFailure("disk full".to_string());
    assert_eq!(storage.exit_code(), exit_codes::OPERATION_FAILED);

    let lock = Error::LockFailed(PathBuf::from("library.json.lock"));
    assert_eq!(lock.exit_code(), exit_codes::OPERATION_FAILED);
}

#[test]
fn json_error_includes_code_and_details() {
    let err = Error::not_found(Level::Stage, "st-1");
    let json = JsonError::from(&err);
    assert_eq!(json.code, exit_codes::USER_ERROR);
    assert!(json.error.contains("Stage not found"));
    let details = json.details.expect("details");
    assert_eq!(details["level"], "stage");
    assert_eq!(details["id"], "st-1");
}

#[test]
fn storage_failure_folding_keeps_core_errors() {
    let io = Error::Io(std::io::Error::other("permission denied"));
    assert!(matches!(io.into_storage_failure(), Error::StorageFailure(_)));

    let index = Error::InvalidIndex { index: 1, len: 0 };
    assert!(matches!(
        index.into_storage_failure(),
        Error::InvalidIndex { index: 1, len: 0 }
    ));

    let violation = Error::ConstraintViolation("duplicate id".to_string());
    assert!(matches!(
        violation.into_storage_failure(),
        Error::ConstraintViolation(_)
    ));
}
