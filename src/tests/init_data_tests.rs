/// Tests for Telegram init data parsing and HMAC verification.
use crate::init_data::{self, InitDataError};
use crate::tests::support::bidder;

const TOKEN: &str = "123456:TEST-bot-token";

#[test]
fn signed_init_data_verifies() {
    let raw = init_data::sign(&bidder(), 1_700_000_000, TOKEN).unwrap();

    let data = init_data::verify(&raw, TOKEN).unwrap();

    assert_eq!(data.user, Some(bidder()));
    assert_eq!(data.auth_date, Some(1_700_000_000));
    assert!(data.hash.is_some());
    assert!(data.data_check_string().starts_with("auth_date=1700000000\nuser="));
}

#[test]
fn wrong_token_is_a_mismatch() {
    let raw = init_data::sign(&bidder(), 1_700_000_000, TOKEN).unwrap();
    assert_eq!(init_data::verify(&raw, "other-token"), Err(InitDataError::HashMismatch));
}

#[test]
fn tampered_field_is_a_mismatch() {
    let raw = init_data::sign(&bidder(), 1_700_000_000, TOKEN).unwrap();
    let tampered = raw.replace("auth_date=1700000000", "auth_date=1700000001");
    assert_eq!(init_data::verify(&tampered, TOKEN), Err(InitDataError::HashMismatch));
}

#[test]
fn unsigned_data_has_no_hash() {
    let raw = init_data::unsigned(&bidder(), 1_700_000_000).unwrap();

    assert_eq!(init_data::verify(&raw, TOKEN), Err(InitDataError::MissingHash));
    let parsed = init_data::parse(&raw).unwrap();
    assert_eq!(parsed.user.map(|u| u.id), Some(42));
}

#[test]
fn non_hex_hash_is_malformed() {
    let err = init_data::verify("auth_date=1&hash=zz", TOKEN).unwrap_err();
    assert!(matches!(err, InitDataError::Malformed { field: "hash", .. }));
}

#[test]
fn bad_user_json_is_malformed() {
    let err = init_data::parse("user=%7Bnot-json&auth_date=1").unwrap_err();
    assert!(matches!(err, InitDataError::Malformed { field: "user", .. }));
}

#[test]
fn extra_fields_are_kept() {
    let data = init_data::parse("query_id=AAH&auth_date=5").unwrap();
    assert_eq!(data.field("query_id"), Some("AAH"));
    assert_eq!(data.user, None);
}
