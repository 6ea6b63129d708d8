//! Operator-facing rendering of the full year's key-rollover grid.
//!
//! `render_text` is a direct port of `rollercoaster/render.py`'s
//! `render_text`: it walks the entire `(quarter, slot)` grid on a scratch
//! copy of the keyring, calling `update` at every step and recording each
//! key's status character, so an operator can see the whole year's planned
//! transitions at a glance rather than just the current tick.
//!
//! The full HTML dashboard (`render.py`'s `render_html`, templated with
//! jinja2 and auto-refreshing) is out of scope; `render_html_placeholder`
//! emits a small static page pointing at the text rendering instead.

use camino::Utf8Path;

use crate::error::SigningError;
use crate::keys::keypair::KeyPair;
use crate::keys::keyring::KeyRing;
use crate::keys::rollover::RolloverPolicy;
use crate::util;

const ROLE_NAMES: [&str; 5] = ["ksk", "zsk-q1", "zsk-q2", "zsk-q3", "zsk-q4"];

/// Renders the full year's rollover grid as fixed-width text, one line per
/// key role per algorithm slot.
///
/// Operates on a clone of `keyring`: the grid walk calls `update` at every
/// one of the 36 slots, which would otherwise leave the live driver's
/// keyring holding whatever flags the last slot in the grid assigned,
/// rather than the flags for the tick actually in progress.
pub fn render_text(keyring: &KeyRing, policy: RolloverPolicy) -> String {
    let mut scratch = keyring.clone();

    let mut rows: Vec<String> = Vec::with_capacity(scratch.slots.len() * ROLE_NAMES.len());
    for slot_idx in 0..scratch.slots.len() {
        for role in ROLE_NAMES {
            rows.push(format!("Algorithm {}, {role:<6}  ", slot_idx + 1));
        }
    }

    for quarter in 1..=4u8 {
        for slot in 1..=9u8 {
            scratch.update(quarter, slot, policy);

            for (slot_idx, algorithm_slot) in scratch.slots.iter().enumerate() {
                let keys: [Option<&KeyPair>; 5] = [
                    algorithm_slot.keys.ksk.as_ref(),
                    algorithm_slot.keys.zsk(1),
                    algorithm_slot.keys.zsk(2),
                    algorithm_slot.keys.zsk(3),
                    algorithm_slot.keys.zsk(4),
                ];
                for (role_idx, key) in keys.into_iter().enumerate() {
                    let status = match key {
                        Some(k) if k.revoked => "R",
                        Some(k) if k.sign => "S",
                        Some(k) if k.publish => "P",
                        _ => " ",
                    };
                    let row = &mut rows[slot_idx * ROLE_NAMES.len() + role_idx];
                    row.push(' ');
                    row.push_str(status);
                    if slot == 9 {
                        row.push_str(" |");
                    }
                }
            }
        }
    }

    rows.join("\n")
}

/// A small static page that points an operator at the text rendering. A
/// templated, auto-refreshing HTML dashboard is a documented non-goal.
pub fn render_html_placeholder(keyring: &KeyRing, policy: RolloverPolicy) -> String {
    let text = render_text(keyring, policy);
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
         <title>key rollover schedule</title></head>\n<body><pre>{}</pre></body></html>\n",
        html_escape(&text)
    )
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Renders and writes the text dashboard to `path`, atomically.
pub fn write_text_dashboard(
    path: &Utf8Path,
    keyring: &KeyRing,
    policy: RolloverPolicy,
) -> Result<(), SigningError> {
    let text = render_text(keyring, policy);
    util::write_file(path, text.as_bytes())
        .map_err(|e| SigningError::Io(path.to_owned(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use domain::base::iana::SecAlg;

    use super::*;
    use crate::keys::keyring::KeySpec;

    #[test]
    fn render_text_has_one_row_per_role_per_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("keyring.json")).unwrap();
        let ring = KeyRing::new(
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
            &path,
        )
        .unwrap();

        let text = render_text(&ring, RolloverPolicy::DoubleSigner);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 10);
        for line in &lines {
            assert!(line.contains(" |"));
        }
    }

    #[test]
    fn render_text_does_not_mutate_the_live_keyring() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("keyring.json")).unwrap();
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
            &path,
        )
        .unwrap();
        ring.update(2, 5, RolloverPolicy::DoubleSigner);
        let before: Vec<_> = ring.publish_set().iter().map(|k| k.name().to_owned()).collect();

        let _ = render_text(&ring, RolloverPolicy::DoubleSigner);

        let after: Vec<_> = ring.publish_set().iter().map(|k| k.name().to_owned()).collect();
        assert_eq!(before, after);
    }
}
