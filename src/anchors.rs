//! Trust-anchor (DS record) file emission.
//!
//! Publishing DS records to a parent zone is an explicit non-goal; writing
//! them to a local file for an operator to hand to a registrar, or to seed
//! `dnssec-trust-anchors.conf`-style configuration, is not. Grounded on
//! `domain`'s own `validate::DnskeyExt::digest`, which this crate reaches
//! via the `unstable-validate` feature.

use camino::Utf8Path;
use domain::base::iana::DigestAlg;
use domain::rdata::Ds;
use domain::validate::DnskeyExt;

use crate::error::SigningError;
use crate::keys::keyring::KeyRing;
use crate::signer::OwnedName;
use crate::util;

/// Writes one DS record per currently published key-signing key, in the
/// zone-file presentation format, for both SHA-1 and SHA-256 digests — the
/// pair most registrars still ask for (RFC 4509 §2 recommends SHA-256 but
/// does not retire SHA-1).
pub fn write_trust_anchors(
    path: &Utf8Path,
    keyring: &KeyRing,
    origin: &OwnedName,
) -> Result<(), SigningError> {
    let mut out = String::new();

    for slot in &keyring.slots {
        let Some(ksk) = &slot.keys.ksk else { continue };
        if !ksk.publish {
            continue;
        }
        let dnskey = ksk.dnskey();

        for digest_alg in [DigestAlg::SHA1, DigestAlg::SHA256] {
            let digest = dnskey
                .digest(origin, digest_alg)
                .map_err(|e| SigningError::Crypto(e.to_string()))?;
            let ds = Ds::new(
                dnskey.key_tag(),
                dnskey.algorithm(),
                digest_alg,
                digest.as_ref().to_vec(),
            )
            .map_err(|e| SigningError::Crypto(e.to_string()))?;

            out.push_str(&format!("{origin} IN DS {ds}\n"));
        }
    }

    util::write_file(path, out.as_bytes()).map_err(|e| SigningError::Io(path.to_owned(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use domain::base::iana::SecAlg;

    use super::*;
    use crate::keys::keyring::KeySpec;
    use crate::keys::rollover::RolloverPolicy;

    #[test]
    fn writes_one_ds_pair_per_published_ksk() {
        let dir = tempfile::tempdir().unwrap();
        let keyring_path =
            camino::Utf8PathBuf::from_path_buf(dir.path().join("keyring.json")).unwrap();
        let mut ring = KeyRing::new(
            [
                KeySpec {
                    algorithm: SecAlg::ECDSAP256SHA256,
                    key_size: None,
                },
                KeySpec {
                    algorithm: SecAlg::ED25519,
                    key_size: None,
                },
            ],
            &keyring_path,
        )
        .unwrap();
        ring.update(1, 1, RolloverPolicy::DoubleSigner);

        let origin: OwnedName = "example.".parse().unwrap();
        let out_path = camino::Utf8PathBuf::from_path_buf(dir.path().join("anchors.txt")).unwrap();
        write_trust_anchors(&out_path, &ring, &origin).unwrap();

        let text = std::fs::read_to_string(&out_path).unwrap();
        let ds_lines: Vec<_> = text.lines().filter(|l| l.contains("DS")).collect();
        assert_eq!(ds_lines.len(), 2);
    }
}
