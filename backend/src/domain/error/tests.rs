//! Tests for error construction and conversion from component errors.

use super::*;
use rstest::rstest;
use serde_json::json;

#[rstest]
fn not_found_constructor_sets_code() {
    let err = Error::not_found("missing");
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert_eq!(err.message(), "missing");
    assert_eq!(err.to_string(), "missing");
}

#[rstest]
#[case(ErrorCode::NotFound, "record not found")]
#[case(ErrorCode::StoreUnavailable, "store unavailable")]
#[case(ErrorCode::InvalidConfiguration, "invalid configuration")]
fn blank_messages_fall_back_to_code_description(#[case] code: ErrorCode, #[case] expected: &str) {
    let err = Error::new(code, "   ");
    assert_eq!(err.message(), expected);
}

#[rstest]
#[case(Error::store_unavailable("timeout"), true)]
#[case(Error::internal("boom"), false)]
#[case(Error::decode("bad field"), false)]
#[case(Error::invalid_configuration("empty cache prefix"), false)]
fn only_store_unavailable_is_retryable(#[case] err: Error, #[case] retryable: bool) {
    assert_eq!(err.is_retryable(), retryable);
}

#[rstest]
#[case(KeyValueStoreError::unavailable("timed out"), ErrorCode::StoreUnavailable)]
#[case(KeyValueStoreError::backend("WRONGTYPE"), ErrorCode::InternalError)]
fn store_errors_map_to_domain_codes(#[case] source: KeyValueStoreError, #[case] code: ErrorCode) {
    let err = Error::from(source);
    assert_eq!(err.code(), code);
}

#[rstest]
fn identifier_errors_map_to_invalid_identifier() {
    let err = Error::from(RecordIdError::Empty);
    assert_eq!(err.code(), ErrorCode::InvalidIdentifier);
}

#[rstest]
fn page_request_errors_map_to_invalid_page_request() {
    let err = Error::from(pagination::PageRequestError::ZeroSize);
    assert_eq!(err.code(), ErrorCode::InvalidPageRequest);
}

#[rstest]
fn serialises_with_snake_case_code() {
    let err = Error::invalid_query("field 'title' is not indexed");
    let value = serde_json::to_value(&err).expect("error serialises");
    assert_eq!(
        value,
        json!({"code": "invalid_query", "message": "field 'title' is not indexed"})
    );
}
