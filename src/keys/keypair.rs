//! A single DNSSEC signing key and its operational flags.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use domain::base::iana::SecAlg;
use domain::crypto::sign::{GenerateParams, KeyPair as CryptoKeyPair, SecretKeyBytes, generate};
use domain::rdata::Dnskey;
use serde::{Deserialize, Serialize};

/// The `ZONE` bit of the DNSKEY flags field (RFC 4034 §2.1.1).
const FLAG_ZONE: u16 = 0x0100;
/// The `SEP` bit, marking a key-signing key (RFC 4034 §2.1.1).
const FLAG_SEP: u16 = 0x0001;
/// The `REVOKE` bit (RFC 5011 §2.1).
const FLAG_REVOKE: u16 = 0x0080;

/// The DNSKEY `protocol` octet; RFC 4034 fixes this at 3 for all DNSSEC keys.
const PROTOCOL: u8 = 3;

/// A single DNSSEC key: algorithm, private material, and the mutable
/// operational flags the rollover state machine assigns every slot.
///
/// `ksk` is fixed at construction. `sign`, `publish` and `revoked` are
/// public and freely mutated by [`crate::keys::rollover`] — `KeyPair` itself
/// enforces no invariant between them; that is the policy's job.
#[derive(Clone)]
pub struct KeyPair {
    algorithm: SecAlg,
    secret_key: SecretKeyBytes,
    /// The key's DNSKEY rdata as it stood right after generation: flags are
    /// `ZONE | (SEP if ksk)`, `revoked` always false. [`KeyPair::dnskey`]
    /// rebuilds the flags field from current state on every call rather
    /// than caching this, since `revoked` must be reflected immediately.
    base_dnskey: Dnskey<Vec<u8>>,
    name: Box<str>,
    ksk: bool,
    pub sign: bool,
    pub publish: bool,
    pub revoked: bool,
}

impl KeyPair {
    /// Generates a fresh key pair using the external crypto library.
    ///
    /// `sign`, `publish` and `revoked` all start false; the driver's first
    /// `update(q, s)` assigns them.
    pub fn generate(
        algorithm: SecAlg,
        key_size: Option<u16>,
        ksk: bool,
        name: impl Into<Box<str>>,
    ) -> Result<Self, GenerateKeyError> {
        let params = generate_params(algorithm, key_size)?;
        let (secret_key, public_key) =
            generate(params).map_err(|e| GenerateKeyError::Crypto(e.to_string()))?;

        let flags = FLAG_ZONE | if ksk { FLAG_SEP } else { 0 };
        let base_dnskey = Dnskey::new(flags, PROTOCOL, algorithm, public_key)
            .map_err(|e| GenerateKeyError::Crypto(e.to_string()))?;

        Ok(KeyPair {
            algorithm,
            secret_key,
            base_dnskey,
            name: name.into(),
            ksk,
            sign: false,
            publish: false,
            revoked: false,
        })
    }

    /// Whether this is a key-signing key. Immutable once generated.
    pub fn is_ksk(&self) -> bool {
        self.ksk
    }

    /// The key's human-readable identifier, e.g. `"a1-ksk"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn algorithm(&self) -> SecAlg {
        self.algorithm
    }

    /// The current DNSKEY flags: `ZONE | (SEP if ksk) | (REVOKE if revoked)`.
    pub fn flags(&self) -> u16 {
        FLAG_ZONE | if self.ksk { FLAG_SEP } else { 0 } | if self.revoked { FLAG_REVOKE } else { 0 }
    }

    /// The DNSKEY wire record for this key's current state.
    ///
    /// Recomputed on every call rather than cached: `revoked` mutates the
    /// flags field, so a cached record would go stale the instant the
    /// rollover policy flips it.
    pub fn dnskey(&self) -> Dnskey<Vec<u8>> {
        Dnskey::new(
            self.flags(),
            PROTOCOL,
            self.algorithm,
            self.base_dnskey.public_key().to_vec(),
        )
        .expect("only the flags octet changed; the public key is unchanged and already valid")
    }

    /// The DNSSEC key tag, recomputed from the current DNSKEY so that a
    /// revoked key's tag reflects the REVOKE bit (RFC 5011 §2.1 changes the
    /// tag on revocation).
    pub fn keytag(&self) -> u16 {
        self.dnskey().key_tag()
    }

    /// Reconstructs the low-level signer used to produce RRSIGs.
    pub fn crypto_key_pair(&self) -> Result<CryptoKeyPair, GenerateKeyError> {
        CryptoKeyPair::from_bytes(&self.secret_key, &self.base_dnskey)
            .map_err(|e| GenerateKeyError::Crypto(e.to_string()))
    }

    /// Converts to the stable, serializable form persisted in the keyring
    /// file (spec §6).
    pub fn to_record(&self) -> KeyRecord {
        let der = self.secret_key.to_pkcs8_der();
        KeyRecord {
            name: self.name.to_string(),
            algorithm: self.algorithm.to_int(),
            keytag: self.keytag(),
            ksk: self.ksk,
            sign: self.sign,
            publish: self.publish,
            revoked: self.revoked,
            private_key: pem_encode(&der),
        }
    }

    /// Reconstructs a `KeyPair` from its persisted form.
    ///
    /// Per spec §4.1, `sign` and `publish` default to true and `revoked` to
    /// false if absent from the record — harmless, since the next
    /// `update(q, s)` resets and recomputes them regardless.
    pub fn from_record(record: &KeyRecord) -> Result<Self, GenerateKeyError> {
        let algorithm = SecAlg::from_int(record.algorithm);
        let der = pem_decode(&record.private_key)
            .map_err(|e| GenerateKeyError::Malformed(e.to_string()))?;
        let secret_key = SecretKeyBytes::from_pkcs8_der(&der)
            .map_err(|e| GenerateKeyError::Malformed(e.to_string()))?;

        let flags = FLAG_ZONE | if record.ksk { FLAG_SEP } else { 0 };
        let public_key = secret_key
            .public_key_bytes(algorithm)
            .map_err(|e| GenerateKeyError::Malformed(e.to_string()))?;
        let base_dnskey = Dnskey::new(flags, PROTOCOL, algorithm, public_key)
            .map_err(|e| GenerateKeyError::Malformed(e.to_string()))?;

        Ok(KeyPair {
            algorithm,
            secret_key,
            base_dnskey,
            name: record.name.clone().into_boxed_str(),
            ksk: record.ksk,
            sign: record.sign,
            publish: record.publish,
            revoked: record.revoked,
        })
    }
}

impl fmt::Display for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.algorithm)
    }
}

/// The JSON shape of a single key within the persisted keyring (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyRecord {
    pub name: String,
    pub algorithm: u8,
    pub keytag: u16,
    pub ksk: bool,
    #[serde(default = "default_true")]
    pub sign: bool,
    #[serde(default = "default_true")]
    pub publish: bool,
    #[serde(default)]
    pub revoked: bool,
    pub private_key: String,
}

fn default_true() -> bool {
    true
}

/// An error generating, loading or parsing a key.
#[derive(Debug)]
pub enum GenerateKeyError {
    /// `algorithm` is not one this crate knows how to generate.
    UnsupportedAlgorithm(SecAlg),
    /// The external crypto library rejected the request.
    Crypto(String),
    /// A persisted key's PEM/PKCS8 encoding was invalid.
    Malformed(String),
}

impl std::error::Error for GenerateKeyError {}

impl fmt::Display for GenerateKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedAlgorithm(alg) => write!(f, "unsupported algorithm: {alg}"),
            Self::Crypto(reason) => write!(f, "{reason}"),
            Self::Malformed(reason) => write!(f, "malformed key: {reason}"),
        }
    }
}

fn generate_params(algorithm: SecAlg, key_size: Option<u16>) -> Result<GenerateParams, GenerateKeyError> {
    Ok(match algorithm {
        SecAlg::RSASHA256 => GenerateParams::RsaSha256 {
            bits: key_size.unwrap_or(2048) as u32,
        },
        SecAlg::RSASHA512 => GenerateParams::RsaSha512 {
            bits: key_size.unwrap_or(2048) as u32,
        },
        SecAlg::ECDSAP256SHA256 => GenerateParams::EcdsaP256Sha256,
        SecAlg::ECDSAP384SHA384 => GenerateParams::EcdsaP384Sha384,
        SecAlg::ED25519 => GenerateParams::Ed25519,
        SecAlg::ED448 => GenerateParams::Ed448,
        other => return Err(GenerateKeyError::UnsupportedAlgorithm(other)),
    })
}

/// Maps a config-file algorithm name (e.g. `"RSASHA256"`) onto a [`SecAlg`].
///
/// Only the algorithms this crate can generate are accepted; every other
/// `SecAlg` variant the `domain` crate knows about (RSASHA1, and so on) is
/// rejected here even though it could in principle be parsed as a DNSKEY.
pub fn algorithm_from_name(name: &str) -> Option<SecAlg> {
    match name {
        "RSASHA256" => Some(SecAlg::RSASHA256),
        "RSASHA512" => Some(SecAlg::RSASHA512),
        "ECDSAP256SHA256" => Some(SecAlg::ECDSAP256SHA256),
        "ECDSAP384SHA384" => Some(SecAlg::ECDSAP384SHA384),
        "ED25519" => Some(SecAlg::ED25519),
        "ED448" => Some(SecAlg::ED448),
        _ => None,
    }
}

const PEM_LABEL: &str = "PRIVATE KEY";

fn pem_encode(der: &[u8]) -> String {
    let body = BASE64.encode(der);
    let mut out = format!("-----BEGIN {PEM_LABEL}-----\n");
    for chunk in body.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(chunk).expect("base64 output is ASCII"));
        out.push('\n');
    }
    out.push_str(&format!("-----END {PEM_LABEL}-----\n"));
    out
}

fn pem_decode(pem: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let body: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    BASE64.decode(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_has_expected_flags() {
        let ksk = KeyPair::generate(SecAlg::ECDSAP256SHA256, None, true, "a1-ksk").unwrap();
        assert_eq!(ksk.flags(), FLAG_ZONE | FLAG_SEP);
        assert!(!ksk.revoked);

        let zsk = KeyPair::generate(SecAlg::ECDSAP256SHA256, None, false, "a1-zsk-q1").unwrap();
        assert_eq!(zsk.flags(), FLAG_ZONE);
    }

    #[test]
    fn revocation_changes_flags_and_keytag() {
        let mut ksk = KeyPair::generate(SecAlg::ECDSAP256SHA256, None, true, "a1-ksk").unwrap();
        let tag_before = ksk.keytag();
        ksk.revoked = true;
        assert_eq!(ksk.flags(), FLAG_ZONE | FLAG_SEP | FLAG_REVOKE);
        assert_ne!(ksk.keytag(), tag_before);
    }

    #[test]
    fn record_round_trip_preserves_identity() {
        let key = KeyPair::generate(SecAlg::ECDSAP256SHA256, None, true, "a1-ksk").unwrap();
        let tag = key.keytag();
        let record = key.to_record();
        let restored = KeyPair::from_record(&record).unwrap();
        assert_eq!(restored.name(), "a1-ksk");
        assert_eq!(restored.algorithm(), SecAlg::ECDSAP256SHA256);
        assert!(restored.is_ksk());
        assert_eq!(restored.keytag(), tag);
    }

    #[test]
    fn unsupported_algorithm_is_rejected() {
        let err = KeyPair::generate(SecAlg::RSASHA1, None, true, "a1-ksk").unwrap_err();
        assert!(matches!(err, GenerateKeyError::UnsupportedAlgorithm(_)));
    }
}
