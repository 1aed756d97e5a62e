//! Compact JWS signatures over destroy claims.
//!
//! A signed claim carries a `signature` field holding `header.payload.sig`
//! (base64url, no padding). The payload is the claim itself without that
//! field, so a verifier checks both the signature and that the payload still
//! matches the claim it is attached to.

pub mod pem;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use destroyclaim_core::{Error, Result};
use ring::rand::SystemRandom;
use ring::signature::{self, Ed25519KeyPair, RsaKeyPair, UnparsedPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub use pem::{
    ed25519_spki, encode_pem, generate_ed25519, parse_pem, private_key_from_pem,
    public_key_from_pem, Pem,
};

const SIGNATURE_FIELD: &str = "signature";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    RS256,
    EdDSA,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::EdDSA => "EdDSA",
        }
    }

    fn verification(self) -> &'static dyn signature::VerificationAlgorithm {
        match self {
            Self::RS256 => &signature::RSA_PKCS1_2048_8192_SHA256,
            Self::EdDSA => &signature::ED25519,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rs256" => Ok(Self::RS256),
            "eddsa" | "ed25519" => Ok(Self::EdDSA),
            other => Err(Error::signature(format!("unsupported algorithm {}", other))),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: Algorithm,
}

/// Sign `claim` with a PKCS#8 private key. Any existing signature is replaced.
pub fn sign_claim(claim: &Value, pkcs8_der: &[u8], alg: Algorithm) -> Result<Value> {
    let mut body = claim_body(claim)?;
    let header = serde_json::to_vec(&Header { alg })?;
    let payload = serde_json::to_vec(&Value::Object(body.clone()))?;
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(payload)
    );

    let sig = match alg {
        Algorithm::RS256 => {
            let key_pair = RsaKeyPair::from_pkcs8(pkcs8_der)
                .map_err(|e| Error::signature(format!("invalid RSA private key: {}", e)))?;
            let mut sig = vec![0; key_pair.public().modulus_len()];
            key_pair
                .sign(
                    &signature::RSA_PKCS1_SHA256,
                    &SystemRandom::new(),
                    signing_input.as_bytes(),
                    &mut sig,
                )
                .map_err(|_| Error::signature("RSA signing failed"))?;
            sig
        }
        Algorithm::EdDSA => {
            let key_pair = Ed25519KeyPair::from_pkcs8_maybe_unchecked(pkcs8_der)
                .map_err(|e| Error::signature(format!("invalid Ed25519 private key: {}", e)))?;
            key_pair.sign(signing_input.as_bytes()).as_ref().to_vec()
        }
    };

    debug!(alg = %alg, "destroy claim signed");
    body.insert(
        SIGNATURE_FIELD.to_string(),
        Value::String(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(sig))),
    );
    Ok(Value::Object(body))
}

/// Check the signature of a signed claim.
///
/// `Ok(false)` means the signature or payload does not match; an unsigned
/// claim or a structurally broken token is an error.
pub fn verify_claim(claim: &Value, public_key: &[u8]) -> Result<bool> {
    let token = claim
        .get(SIGNATURE_FIELD)
        .ok_or_else(|| Error::signature("destroy claim not signed"))?
        .as_str()
        .ok_or_else(|| Error::signature("signature must be a string"))?;

    let mut parts = token.split('.');
    let (header_b64, payload_b64, sig_b64) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(Error::signature("signature is not a compact JWS")),
        };

    let header: Header = serde_json::from_slice(&decode(header_b64, "header")?)
        .map_err(|e| Error::signature(format!("unsupported JWS header: {}", e)))?;
    let sig = match URL_SAFE_NO_PAD.decode(sig_b64) {
        Ok(sig) => sig,
        Err(_) => return Ok(false),
    };

    let signing_input = &token[..header_b64.len() + 1 + payload_b64.len()];
    let key = UnparsedPublicKey::new(header.alg.verification(), public_key);
    if key.verify(signing_input.as_bytes(), &sig).is_err() {
        debug!(alg = %header.alg, "destroy claim signature rejected");
        return Ok(false);
    }

    let payload: Value = serde_json::from_slice(&decode(payload_b64, "payload")?)?;
    let matches = payload == Value::Object(claim_body(claim)?);
    if !matches {
        debug!("signed payload differs from destroy claim");
    }
    Ok(matches)
}

fn claim_body(claim: &Value) -> Result<Map<String, Value>> {
    let mut body = claim
        .as_object()
        .cloned()
        .ok_or_else(|| Error::invalid_argument("destroy claim must be a JSON object"))?;
    body.remove(SIGNATURE_FIELD);
    Ok(body)
}

fn decode(part: &str, what: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|e| Error::signature(format!("JWS {} is not base64url: {}", what, e)))
}
