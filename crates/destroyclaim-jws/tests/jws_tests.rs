use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use destroyclaim_core::Error;
use destroyclaim_jws::*;
use serde_json::{json, Value};

fn claim() -> Value {
    json!({
        "id": "dc-jws",
        "strictMode": false,
        "destroySubjects": [
            { "id": "s1", "name": "std:sha256", "payload": { "hash": "00ff" } }
        ],
        "destroyActions": [
            { "id": "a1", "name": "std:destructionLevel", "payload": { "destructionLevel": "wiped" } }
        ]
    })
}

fn keys() -> (Vec<u8>, Vec<u8>) {
    generate_ed25519().unwrap()
}

// ============================================================================
// Sign / verify
// ============================================================================

#[test]
fn signed_claim_carries_signature() {
    let (private, _) = keys();
    let signed = sign_claim(&claim(), &private, Algorithm::EdDSA).unwrap();
    let token = signed["signature"].as_str().unwrap();
    assert_eq!(token.split('.').count(), 3);
    assert_eq!(signed["id"], "dc-jws");
}

#[test]
fn signature_verifies_with_matching_key() {
    let (private, public) = keys();
    let signed = sign_claim(&claim(), &private, Algorithm::EdDSA).unwrap();
    assert!(verify_claim(&signed, &public).unwrap());
}

#[test]
fn signature_fails_with_other_key() {
    let (private, _) = keys();
    let (_, other_public) = keys();
    let signed = sign_claim(&claim(), &private, Algorithm::EdDSA).unwrap();
    assert!(!verify_claim(&signed, &other_public).unwrap());
}

#[test]
fn tampered_signature_fails() {
    let (private, public) = keys();
    let mut signed = sign_claim(&claim(), &private, Algorithm::EdDSA).unwrap();
    let token = signed["signature"].as_str().unwrap().to_string();
    let (input, _) = token.rsplit_once('.').unwrap();
    signed["signature"] = json!(format!("{}.{}", input, URL_SAFE_NO_PAD.encode([0u8; 64])));
    assert!(!verify_claim(&signed, &public).unwrap());
}

#[test]
fn tampered_claim_fails() {
    let (private, public) = keys();
    let mut signed = sign_claim(&claim(), &private, Algorithm::EdDSA).unwrap();
    signed["destroyActions"][0]["payload"]["destructionLevel"] = json!("deleted");
    assert!(!verify_claim(&signed, &public).unwrap());
}

#[test]
fn resigning_replaces_signature() {
    let (first, _) = keys();
    let (second, second_public) = keys();
    let signed = sign_claim(&claim(), &first, Algorithm::EdDSA).unwrap();
    let resigned = sign_claim(&signed, &second, Algorithm::EdDSA).unwrap();
    assert!(verify_claim(&resigned, &second_public).unwrap());
}

// ============================================================================
// Malformed input
// ============================================================================

#[test]
fn unsigned_claim_is_an_error() {
    let (_, public) = keys();
    let err = verify_claim(&claim(), &public).unwrap_err();
    assert!(matches!(err, Error::Signature(ref m) if m.contains("not signed")));
}

#[test]
fn unsupported_header_is_an_error() {
    let (_, public) = keys();
    let mut unsigned = claim();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
    unsigned["signature"] = json!(format!("{}.e30.AAAA", header));
    assert!(verify_claim(&unsigned, &public).is_err());
}

#[test]
fn non_compact_token_is_an_error() {
    let (_, public) = keys();
    let mut unsigned = claim();
    unsigned["signature"] = json!("only.two");
    assert!(verify_claim(&unsigned, &public).is_err());
}

// ============================================================================
// PEM keys
// ============================================================================

#[test]
fn pem_encoded_keys_round_trip() {
    let (private, public) = keys();
    let private_pem = encode_pem("PRIVATE KEY", &private);
    let public_pem = encode_pem("PUBLIC KEY", &ed25519_spki(&public));

    let signed = sign_claim(
        &claim(),
        &private_key_from_pem(&private_pem).unwrap(),
        Algorithm::EdDSA,
    )
    .unwrap();
    assert!(verify_claim(&signed, &public_key_from_pem(&public_pem).unwrap()).unwrap());
}
