//! The rollover policies: per-(quarter, slot) flag assignment over an
//! already-`reset()` [`KeyRing`] (spec §4.3).
//!
//! Each variant is pure flag assignment — no I/O, no failure modes, matching
//! spec §7's "the state machine has no failure modes of its own." Structured
//! one match arm per quarter, mirroring `rollercoaster/keyring.py`'s
//! `update()` methods directly so the two stay easy to compare.

use crate::keys::keyring::KeyRing;

/// Which rollover state machine a [`KeyRing`] runs under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RolloverPolicy {
    /// Both algorithms publish and sign through the full overlap window
    /// (quarters 2-4 of the handover year).
    DoubleSigner,
    /// The incoming algorithm is published early but only takes over
    /// signing once the outgoing algorithm's quarter ends.
    SingleSigner,
    /// Double-signer, plus the next year's KSK is published a full quarter
    /// early.
    Hybrid,
}

impl RolloverPolicy {
    /// Assigns `sign`/`publish`/`revoked` on every key in `ring` for
    /// `(quarter, slot)`. Callers must have already reset all flags
    /// ([`KeyRing::update`] does this).
    pub fn apply(self, quarter: u8, slot: u8, ring: &mut KeyRing) {
        match self {
            RolloverPolicy::DoubleSigner => apply_double_signer(quarter, slot, ring),
            RolloverPolicy::SingleSigner => apply_single_signer(quarter, slot, ring),
            RolloverPolicy::Hybrid => {
                apply_double_signer(quarter, slot, ring);
                apply_hybrid_delta(quarter, slot, ring);
            }
        }
    }
}

/// Double-signer policy (spec §4.3 table; `KeyRingDoubleSigner.update`).
fn apply_double_signer(quarter: u8, slot: u8, ring: &mut KeyRing) {
    let [a1, a2] = &mut ring.slots;
    let a1 = &mut a1.keys;
    let a2 = &mut a2.keys;

    match quarter {
        1 => {
            set(a1.ksk.as_mut(), true, true, false);
            set(a1.zsk_mut(1), true, true, false);

            if slot == 1 {
                publish(a1.zsk_mut(4));
            }
            if slot == 9 {
                publish(a1.zsk_mut(2));
            }
        }
        2 => {
            set(a1.ksk.as_mut(), true, true, false);
            set(a1.zsk_mut(2), true, true, false);

            if slot == 1 {
                publish(a1.zsk_mut(1));
            }
            if slot > 1 {
                set(a2.ksk.as_mut(), true, true, false);
                set(a2.zsk_mut(2), true, true, false);
            }
            if slot == 9 {
                publish(a1.zsk_mut(3));
                publish(a2.zsk_mut(3));
            }
        }
        3 => {
            set(a1.ksk.as_mut(), true, true, false);
            set(a1.zsk_mut(3), true, true, false);
            set(a2.ksk.as_mut(), true, true, false);
            set(a2.zsk_mut(3), true, true, false);

            if slot == 1 {
                publish(a1.zsk_mut(2));
                publish(a2.zsk_mut(2));
            }
            if slot == 9 {
                publish(a1.zsk_mut(4));
                publish(a2.zsk_mut(4));
            }
        }
        4 => {
            set(a1.ksk.as_mut(), true, true, false);
            set(a1.zsk_mut(4), true, true, false);
            set(a2.ksk.as_mut(), true, true, false);
            set(a2.zsk_mut(4), true, true, false);

            if slot == 1 {
                publish(a1.zsk_mut(3));
                publish(a2.zsk_mut(3));
            }
            if slot > 1 {
                set(a1.zsk_mut(4), false, false, false);
            }
            if slot > 1 && slot < 9 {
                // The source implementation sets only `revoked` here,
                // leaving the REVOKE announcement unpublished (spec §8
                // invariant 8, §9). The single-signer policy below already
                // re-enables `publish`/`sign` alongside `revoked`; this
                // crate applies the same fix here.
                set(a1.ksk.as_mut(), true, true, true);
            }
            if slot == 9 {
                set(a1.ksk.as_mut(), false, false, false);
                publish(a2.zsk_mut(1));
            }
        }
        _ => unreachable!("quarter is always in 1..=4"),
    }
}

/// Single-signer policy (spec §4.3 "Same skeleton but the overlap period is
/// shorter"; `KeyRingSingleSigner.update`).
fn apply_single_signer(quarter: u8, slot: u8, ring: &mut KeyRing) {
    let [a1, a2] = &mut ring.slots;
    let a1 = &mut a1.keys;
    let a2 = &mut a2.keys;

    match quarter {
        1 => {
            set(a1.ksk.as_mut(), true, true, false);
            set(a1.zsk_mut(1), true, true, false);

            if slot == 1 {
                publish(a1.zsk_mut(4));
            }
            if slot == 9 {
                publish(a1.zsk_mut(2));
            }
        }
        2 => {
            set(a1.ksk.as_mut(), true, true, false);
            set(a1.zsk_mut(2), true, true, false);

            if slot == 1 {
                publish(a1.zsk_mut(1));
            }
            if slot > 1 {
                // Publish next year's KSK, but don't sign with it yet —
                // the overlap here is publish-only, unlike the
                // double-signer's full double-signing window.
                set(a2.ksk.as_mut(), true, false, false);
            }
            if slot == 9 {
                publish(a1.zsk_mut(3));
            }
        }
        3 => {
            // a1's ZSK takes no further part; a1's KSK is left at
            // whatever `reset()` set (false) unless slot 1 below
            // re-enables it.
            set(a2.ksk.as_mut(), true, true, false);
            set(a2.zsk_mut(3), true, true, false);

            if slot == 1 {
                // Re-publish (not re-sign) the outgoing KSK one slot into
                // the quarter, and pre-publish a1's own next ZSK.
                publish(a1.ksk.as_mut());
                publish(a1.zsk_mut(2));
            }
            if slot == 9 {
                publish(a2.zsk_mut(4));
            }
        }
        4 => {
            set(a2.ksk.as_mut(), true, true, false);
            set(a2.zsk_mut(4), true, true, false);

            if slot == 1 {
                publish(a2.zsk_mut(3));
            }
            if slot > 1 && slot < 9 {
                set(a1.ksk.as_mut(), true, true, true);
            }
            if slot == 9 {
                set(a1.ksk.as_mut(), false, false, false);
                publish(a2.zsk_mut(1));
            }
        }
        _ => unreachable!("quarter is always in 1..=4"),
    }
}

/// The hybrid delta over double-signer: next year's KSK is published a
/// full quarter early (spec §4.3 "Hybrid policy"; `KeyRingHybridSigner`).
fn apply_hybrid_delta(quarter: u8, slot: u8, ring: &mut KeyRing) {
    let a2 = &mut ring.slots[1].keys;
    if quarter == 1 || (quarter == 2 && slot == 1) {
        publish(a2.ksk.as_mut());
    }
}

fn set(key: Option<&mut crate::keys::keypair::KeyPair>, publish: bool, sign: bool, revoked: bool) {
    if let Some(key) = key {
        key.publish = publish;
        key.sign = sign;
        key.revoked = revoked;
    }
}

fn publish(key: Option<&mut crate::keys::keypair::KeyPair>) {
    if let Some(key) = key {
        key.publish = true;
    }
}
