//! PEM armor and the few DER structures needed to load keys

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use destroyclaim_core::{Error, Result};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};

/// A decoded PEM block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pem {
    pub label: String,
    pub der: Vec<u8>,
}

/// Decode the first PEM block in `text`. Line breaks inside the body are optional.
pub fn parse_pem(text: &str) -> Result<Pem> {
    const BEGIN: &str = "-----BEGIN ";
    const DASHES: &str = "-----";

    let start = text
        .find(BEGIN)
        .ok_or_else(|| Error::signature("no PEM block found"))?;
    let after = &text[start + BEGIN.len()..];
    let label_end = after
        .find(DASHES)
        .ok_or_else(|| Error::signature("unterminated PEM header"))?;
    let label = &after[..label_end];
    let rest = &after[label_end + DASHES.len()..];
    let end_marker = format!("-----END {}-----", label);
    let body_end = rest
        .find(&end_marker)
        .ok_or_else(|| Error::signature(format!("missing '{}'", end_marker)))?;

    let body: String = rest[..body_end].chars().filter(|c| !c.is_whitespace()).collect();
    let der = STANDARD
        .decode(body)
        .map_err(|e| Error::signature(format!("invalid PEM body: {}", e)))?;
    Ok(Pem {
        label: label.to_string(),
        der,
    })
}

/// Armor `der` with 64-column lines.
pub fn encode_pem(label: &str, der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut out = format!("-----BEGIN {}-----\n", label);
    for chunk in body.as_bytes().chunks(64) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", label));
    out
}

/// PKCS#8 DER from a `PRIVATE KEY` block.
pub fn private_key_from_pem(text: &str) -> Result<Vec<u8>> {
    let pem = parse_pem(text)?;
    match pem.label.as_str() {
        "PRIVATE KEY" => Ok(pem.der),
        other => Err(Error::signature(format!(
            "expected a PKCS#8 PRIVATE KEY block, found {}",
            other
        ))),
    }
}

/// Public key bytes in the form signature verification expects:
/// `RSAPublicKey` DER for RSA, the raw 32 bytes for Ed25519.
pub fn public_key_from_pem(text: &str) -> Result<Vec<u8>> {
    let pem = parse_pem(text)?;
    match pem.label.as_str() {
        "PUBLIC KEY" => spki_public_key(&pem.der)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| Error::signature("malformed SubjectPublicKeyInfo")),
        "RSA PUBLIC KEY" => Ok(pem.der),
        other => Err(Error::signature(format!("unsupported public key block {}", other))),
    }
}

/// Fresh Ed25519 key: `(pkcs8_der, raw_public_key)`.
pub fn generate_ed25519() -> Result<(Vec<u8>, Vec<u8>)> {
    let rng = SystemRandom::new();
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
        .map_err(|_| Error::signature("Ed25519 key generation failed"))?;
    let pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
        .map_err(|e| Error::signature(format!("generated key rejected: {}", e)))?;
    Ok((pkcs8.as_ref().to_vec(), pair.public_key().as_ref().to_vec()))
}

/// Wrap a raw Ed25519 public key in SubjectPublicKeyInfo DER.
pub fn ed25519_spki(raw: &[u8]) -> Vec<u8> {
    // SEQUENCE { SEQUENCE { OID 1.3.101.112 }, BIT STRING }
    const PREFIX: [u8; 12] = [
        0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
    ];
    let mut der = PREFIX.to_vec();
    der.extend_from_slice(raw);
    der
}

/// The subjectPublicKey bits of a SubjectPublicKeyInfo.
fn spki_public_key(der: &[u8]) -> Option<&[u8]> {
    let (tag, spki, _) = read_tlv(der)?;
    if tag != 0x30 {
        return None;
    }
    let (tag, _algorithm, rest) = read_tlv(spki)?;
    if tag != 0x30 {
        return None;
    }
    let (tag, bits, _) = read_tlv(rest)?;
    if tag != 0x03 {
        return None;
    }
    match bits.split_first() {
        Some((0, key)) => Some(key),
        _ => None,
    }
}

/// `(tag, contents, remainder)` of one DER element.
fn read_tlv(input: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    let (&tag, rest) = input.split_first()?;
    let (&first, rest) = rest.split_first()?;
    let (len, rest) = if first < 0x80 {
        (first as usize, rest)
    } else {
        let n = (first & 0x7f) as usize;
        if n == 0 || n > 4 || rest.len() < n {
            return None;
        }
        let len = rest[..n].iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (len, &rest[n..])
    };
    if rest.len() < len {
        return None;
    }
    Some((tag, &rest[..len], &rest[len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_round_trip_without_line_breaks() {
        let der = vec![1u8, 2, 3, 4, 5, 250];
        let armored = encode_pem("PRIVATE KEY", &der);
        let single_line = armored.replace('\n', "");
        assert_eq!(private_key_from_pem(&single_line).unwrap(), der);
    }

    #[test]
    fn wrong_label_is_rejected() {
        let armored = encode_pem("CERTIFICATE", &[1, 2, 3]);
        assert!(private_key_from_pem(&armored).is_err());
        assert!(public_key_from_pem(&armored).is_err());
    }

    #[test]
    fn missing_end_marker_is_rejected() {
        assert!(parse_pem("-----BEGIN PUBLIC KEY-----AAAA").is_err());
        assert!(parse_pem("no armor here").is_err());
    }

    #[test]
    fn ed25519_spki_unwraps_to_raw_key() {
        let (_, public) = generate_ed25519().unwrap();
        let armored = encode_pem("PUBLIC KEY", &ed25519_spki(&public));
        assert_eq!(public_key_from_pem(&armored).unwrap(), public);
    }

    #[test]
    fn long_form_length_is_read() {
        let mut der = vec![0x04, 0x81, 0x80];
        der.extend(std::iter::repeat(7u8).take(0x80));
        let (tag, contents, rest) = read_tlv(&der).unwrap();
        assert_eq!(tag, 0x04);
        assert_eq!(contents.len(), 0x80);
        assert!(rest.is_empty());
    }
}
