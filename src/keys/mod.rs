//! The key-rollover state machine: a single [`keypair::KeyPair`], the
//! [`keyring::KeyRing`] that holds two algorithm slots of them, and the
//! [`rollover`] policies that recompute each key's flags every slot.

pub mod keypair;
pub mod keyring;
pub mod rollover;
pub mod schedule;
