//! The central state container: two algorithm slots, each a KSK plus four
//! quarterly ZSKs (spec §3, §4.2).

use std::fs;

use camino::Utf8Path;
use domain::base::iana::SecAlg;
use serde::{Deserialize, Serialize};

use crate::error::KeyringError;
use crate::keys::keypair::{GenerateKeyError, KeyPair, KeyRecord};
use crate::keys::rollover::RolloverPolicy;
use crate::util;

/// An algorithm and, for variable-length algorithms, a key size in bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySpec {
    pub algorithm: SecAlg,
    pub key_size: Option<u16>,
}

/// The five well-known roles a [`KeyPairSet`] may hold, matching spec §9's
/// preference for a fixed struct over a stringly-typed map.
#[derive(Clone)]
pub struct KeyPairSet {
    pub ksk: Option<KeyPair>,
    pub zsk_q1: Option<KeyPair>,
    pub zsk_q2: Option<KeyPair>,
    pub zsk_q3: Option<KeyPair>,
    pub zsk_q4: Option<KeyPair>,
}

impl KeyPairSet {
    fn empty() -> Self {
        KeyPairSet {
            ksk: None,
            zsk_q1: None,
            zsk_q2: None,
            zsk_q3: None,
            zsk_q4: None,
        }
    }

    /// Iterates over every present key in the set, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut KeyPair> {
        [
            &mut self.ksk,
            &mut self.zsk_q1,
            &mut self.zsk_q2,
            &mut self.zsk_q3,
            &mut self.zsk_q4,
        ]
        .into_iter()
        .flatten()
    }

    /// Iterates over every present key in the set.
    pub fn iter(&self) -> impl Iterator<Item = &KeyPair> {
        [
            &self.ksk,
            &self.zsk_q1,
            &self.zsk_q2,
            &self.zsk_q3,
            &self.zsk_q4,
        ]
        .into_iter()
        .flatten()
    }

    /// The ZSK for quarter `q` (1..=4).
    pub fn zsk(&self, q: u8) -> Option<&KeyPair> {
        match q {
            1 => self.zsk_q1.as_ref(),
            2 => self.zsk_q2.as_ref(),
            3 => self.zsk_q3.as_ref(),
            4 => self.zsk_q4.as_ref(),
            _ => None,
        }
    }

    /// Mutable access to the ZSK for quarter `q` (1..=4).
    pub fn zsk_mut(&mut self, q: u8) -> Option<&mut KeyPair> {
        match q {
            1 => self.zsk_q1.as_mut(),
            2 => self.zsk_q2.as_mut(),
            3 => self.zsk_q3.as_mut(),
            4 => self.zsk_q4.as_mut(),
            _ => None,
        }
    }
}

/// A single algorithm slot: its keyspec plus the key set generated for it.
#[derive(Clone)]
pub struct AlgorithmSlot {
    pub keyspec: KeySpec,
    pub keys: KeyPairSet,
}

/// Two algorithm slots — index 0 is "current", index 1 is "incoming" — and
/// the optional path this ring is persisted to.
#[derive(Clone)]
pub struct KeyRing {
    pub slots: [AlgorithmSlot; 2],
    path: Option<camino::Utf8PathBuf>,
}

impl KeyRing {
    /// Loads the keyring persisted at `path`, or generates a fresh one if
    /// no file exists yet (spec §3 "Lifecycle", §7 "missing keyring file").
    pub fn new(keyspecs: [KeySpec; 2], path: &Utf8Path) -> Result<Self, KeyringError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_text(path, &text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(%path, "no persisted keyring found, generating a fresh one");
                let mut ring = KeyRing {
                    slots: [
                        AlgorithmSlot {
                            keyspec: keyspecs[0],
                            keys: KeyPairSet::empty(),
                        },
                        AlgorithmSlot {
                            keyspec: keyspecs[1],
                            keys: KeyPairSet::empty(),
                        },
                    ],
                    path: Some(path.to_owned()),
                };
                ring.generate(1, 1)
                    .map_err(|e| KeyringError::Malformed(path.to_owned(), e.to_string()))?;
                Ok(ring)
            }
            Err(e) => Err(KeyringError::Io(path.to_owned(), e.to_string())),
        }
    }

    /// Ensures every slot has a `ksk` and four `zsk-qN` keys, per spec
    /// §4.2. Two special-case deletions precede the fill:
    ///
    /// - `(q=1, s=1)`: delete all keys in slot 1 (the incoming algorithm's
    ///   keyset is regenerated fresh at the start of every year).
    /// - `(q=1, s=2)`: delete `zsk-q4` from slot 0 (the retiring
    ///   algorithm's last ZSK is regenerated for the coming year).
    pub fn generate(&mut self, quarter: u8, slot: u8) -> Result<(), GenerateKeyError> {
        if (quarter, slot) == (1, 1) {
            self.slots[1].keys = KeyPairSet::empty();
        }
        if (quarter, slot) == (1, 2) {
            self.slots[0].keys.zsk_q4 = None;
        }

        for (i, algorithm_slot) in self.slots.iter_mut().enumerate() {
            let keyspec = algorithm_slot.keyspec;
            let keys = &mut algorithm_slot.keys;

            if keys.ksk.is_none() {
                keys.ksk = Some(KeyPair::generate(
                    keyspec.algorithm,
                    keyspec.key_size,
                    true,
                    format!("a{}-ksk", i + 1),
                )?);
            }
            for q in 1..=4u8 {
                if keys.zsk(q).is_none() {
                    let fresh = KeyPair::generate(
                        keyspec.algorithm,
                        keyspec.key_size,
                        false,
                        format!("a{}-zsk-q{}", i + 1, q),
                    )?;
                    *match q {
                        1 => &mut keys.zsk_q1,
                        2 => &mut keys.zsk_q2,
                        3 => &mut keys.zsk_q3,
                        _ => &mut keys.zsk_q4,
                    } = Some(fresh);
                }
            }
        }

        Ok(())
    }

    /// Resets every flag on every key in both slots.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            for key in slot.keys.iter_mut() {
                key.sign = false;
                key.publish = false;
                key.revoked = false;
            }
        }
    }

    /// Recomputes every key's flags for `(quarter, slot)` under `policy`.
    pub fn update(&mut self, quarter: u8, slot: u8, policy: RolloverPolicy) {
        self.reset();
        policy.apply(quarter, slot, self);
    }

    /// Swaps the two algorithm slots, promoting the incoming algorithm to
    /// current. Invoked exactly once per year, after `update(4, 9)`.
    pub fn rotate(&mut self) {
        self.slots.swap(0, 1);
    }

    /// All keys with `publish == true`, across both slots.
    pub fn publish_set(&self) -> Vec<&KeyPair> {
        self.slots
            .iter()
            .flat_map(|slot| slot.keys.iter())
            .filter(|key| key.publish)
            .collect()
    }

    /// All keys with `sign == true`, across both slots.
    pub fn sign_set(&self) -> Vec<&KeyPair> {
        self.slots
            .iter()
            .flat_map(|slot| slot.keys.iter())
            .filter(|key| key.sign)
            .collect()
    }

    /// Serializes `{keyspecs, keys: [slot0, slot1]}` as pretty JSON and
    /// writes it atomically (spec §6, §5).
    pub fn save(&self) -> Result<(), KeyringError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let doc = PersistedKeyRing {
            keyspecs: [persist_spec(self.slots[0].keyspec), persist_spec(self.slots[1].keyspec)],
            keys: [persist_set(&self.slots[0].keys), persist_set(&self.slots[1].keys)],
        };
        let json = serde_json::to_vec_pretty(&doc)
            .map_err(|e| KeyringError::Malformed(path.clone(), e.to_string()))?;
        util::write_file(path, &json).map_err(|e| KeyringError::Io(path.clone(), e.to_string()))
    }

    /// Parses an already-read keyring file's contents. Split out from
    /// [`KeyRing::new`] so the "missing file" and "malformed file" cases
    /// can be told apart by `io::ErrorKind` rather than by matching on
    /// error text.
    ///
    /// The persisted `keyspecs` are authoritative here, not whatever the
    /// caller's configuration happens to say: `rotate()` swaps `keyspecs`
    /// along with `keypairs`, so after any rotation slot 0's keys no longer
    /// match the config's original, unrotated algorithm order. Matching
    /// `rollercoaster/keyring.py::load()`, which overwrites `self.keyspecs`
    /// from the file unconditionally.
    fn from_text(path: &Utf8Path, text: &str) -> Result<Self, KeyringError> {
        let doc: PersistedKeyRing = serde_json::from_str(text)
            .map_err(|e| KeyringError::Malformed(path.to_owned(), e.to_string()))?;

        let load_set = |set: &PersistedKeySet| -> Result<KeyPairSet, KeyringError> {
            let load_one = |record: &Option<KeyRecord>| -> Result<Option<KeyPair>, KeyringError> {
                record
                    .as_ref()
                    .map(|r| KeyPair::from_record(r).map_err(|e| KeyringError::Malformed(path.to_owned(), e.to_string())))
                    .transpose()
            };
            Ok(KeyPairSet {
                ksk: load_one(&set.ksk)?,
                zsk_q1: load_one(&set.zsk_q1)?,
                zsk_q2: load_one(&set.zsk_q2)?,
                zsk_q3: load_one(&set.zsk_q3)?,
                zsk_q4: load_one(&set.zsk_q4)?,
            })
        };

        let [spec0, spec1] = &doc.keyspecs;
        let [set0, set1] = &doc.keys;
        Ok(KeyRing {
            slots: [
                AlgorithmSlot {
                    keyspec: parse_spec(spec0),
                    keys: load_set(set0)?,
                },
                AlgorithmSlot {
                    keyspec: parse_spec(spec1),
                    keys: load_set(set1)?,
                },
            ],
            path: Some(path.to_owned()),
        })
    }
}

fn persist_spec(spec: KeySpec) -> PersistedKeySpec {
    PersistedKeySpec {
        algorithm: spec.algorithm.to_int(),
        key_size: spec.key_size,
    }
}

fn parse_spec(spec: &PersistedKeySpec) -> KeySpec {
    KeySpec {
        algorithm: SecAlg::from_int(spec.algorithm),
        key_size: spec.key_size,
    }
}

fn persist_set(set: &KeyPairSet) -> PersistedKeySet {
    PersistedKeySet {
        ksk: set.ksk.as_ref().map(KeyPair::to_record),
        zsk_q1: set.zsk_q1.as_ref().map(KeyPair::to_record),
        zsk_q2: set.zsk_q2.as_ref().map(KeyPair::to_record),
        zsk_q3: set.zsk_q3.as_ref().map(KeyPair::to_record),
        zsk_q4: set.zsk_q4.as_ref().map(KeyPair::to_record),
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedKeyRing {
    keyspecs: [PersistedKeySpec; 2],
    keys: [PersistedKeySet; 2],
}

#[derive(Serialize, Deserialize)]
struct PersistedKeySpec {
    algorithm: u8,
    key_size: Option<u16>,
}

#[derive(Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PersistedKeySet {
    ksk: Option<KeyRecord>,
    #[serde(rename = "zsk-q1")]
    zsk_q1: Option<KeyRecord>,
    #[serde(rename = "zsk-q2")]
    zsk_q2: Option<KeyRecord>,
    #[serde(rename = "zsk-q3")]
    zsk_q3: Option<KeyRecord>,
    #[serde(rename = "zsk-q4")]
    zsk_q4: Option<KeyRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyspecs() -> [KeySpec; 2] {
        [
            KeySpec {
                algorithm: SecAlg::RSASHA256,
                key_size: Some(2048),
            },
            KeySpec {
                algorithm: SecAlg::ECDSAP256SHA256,
                key_size: None,
            },
        ]
    }

    #[test]
    fn fresh_keyring_is_fully_populated_and_idle() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("keyring.json")).unwrap();
        let ring = KeyRing::new(keyspecs(), &path).unwrap();
        for slot in &ring.slots {
            assert!(slot.keys.ksk.is_some());
            for q in 1..=4 {
                assert!(slot.keys.zsk(q).is_some());
            }
            for key in slot.keys.iter() {
                assert!(!key.sign && !key.publish && !key.revoked);
            }
        }
    }

    #[test]
    fn generate_at_1_1_clears_incoming_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("keyring.json")).unwrap();
        let mut ring = KeyRing::new(keyspecs(), &path).unwrap();
        let old_tag = ring.slots[1].keys.ksk.as_ref().unwrap().keytag();
        ring.generate(1, 1).unwrap();
        let new_tag = ring.slots[1].keys.ksk.as_ref().unwrap().keytag();
        assert_ne!(old_tag, new_tag);
    }

    #[test]
    fn generate_at_1_2_clears_slot0_zsk_q4() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("keyring.json")).unwrap();
        let mut ring = KeyRing::new(keyspecs(), &path).unwrap();
        let old_tag = ring.slots[0].keys.zsk_q4.as_ref().unwrap().keytag();
        ring.generate(1, 2).unwrap();
        let new_tag = ring.slots[0].keys.zsk_q4.as_ref().unwrap().keytag();
        assert_ne!(old_tag, new_tag);
    }

    #[test]
    fn save_then_load_round_trips_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("keyring.json")).unwrap();
        let mut ring = KeyRing::new(keyspecs(), &path).unwrap();
        ring.update(2, 5, RolloverPolicy::DoubleSigner);
        ring.save().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut reloaded = KeyRing::from_text(&path, &text).unwrap();
        for (q, s) in [(1, 1), (2, 5), (4, 9)] {
            ring.update(q, s, RolloverPolicy::DoubleSigner);
            reloaded.update(q, s, RolloverPolicy::DoubleSigner);
            let a: Vec<_> = ring.publish_set().iter().map(|k| k.name().to_owned()).collect();
            let b: Vec<_> = reloaded.publish_set().iter().map(|k| k.name().to_owned()).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn save_then_load_keeps_keyspecs_in_rotated_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("keyring.json")).unwrap();
        let mut ring = KeyRing::new(keyspecs(), &path).unwrap();
        ring.update(4, 9, RolloverPolicy::DoubleSigner);
        ring.rotate();
        ring.save().unwrap();

        // The caller passes the original, unrotated `keyspecs()` order here,
        // the way the driver always does (it reloads from `config.algorithms`
        // on every restart) — the persisted file's own order must win.
        let text = std::fs::read_to_string(&path).unwrap();
        let reloaded = KeyRing::from_text(&path, &text).unwrap();

        assert_eq!(reloaded.slots[0].keyspec.algorithm, ring.slots[0].keyspec.algorithm);
        assert_eq!(reloaded.slots[1].keyspec.algorithm, ring.slots[1].keyspec.algorithm);
        assert_ne!(reloaded.slots[0].keyspec.algorithm, keyspecs()[0].algorithm);
    }

    #[test]
    fn rotate_swaps_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("keyring.json")).unwrap();
        let mut ring = KeyRing::new(keyspecs(), &path).unwrap();
        let current_tag = ring.slots[0].keys.ksk.as_ref().unwrap().keytag();
        ring.rotate();
        assert_eq!(ring.slots[1].keys.ksk.as_ref().unwrap().keytag(), current_tag);
    }
}
