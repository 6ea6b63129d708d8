//! Error types for the driver's three failure classes (spec §7):
//! configuration, keyring, and signing/zone errors.

use std::fmt;

use camino::Utf8PathBuf;

//----------- ConfigError -------------------------------------------------------

/// A fatal configuration error, detected at startup.
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    Io(Utf8PathBuf, String),
    /// The configuration file is not valid TOML, or is missing required
    /// keys.
    Parse(Utf8PathBuf, String),
    /// `mode` named something other than `"double"`, `"single"` or
    /// `"hybrid"`.
    UnknownMode(String),
    /// `algorithms` did not name a supported DNSSEC algorithm.
    UnknownAlgorithm(String),
    /// Fewer or more than two entries were given in `algorithms`.
    WrongAlgorithmCount(usize),
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(path, reason) => write!(f, "could not read '{path}': {reason}"),
            Self::Parse(path, reason) => write!(f, "could not parse '{path}': {reason}"),
            Self::UnknownMode(mode) => {
                write!(f, "unknown rollover mode '{mode}' (expected 'double', 'single' or 'hybrid')")
            }
            Self::UnknownAlgorithm(name) => write!(f, "unknown DNSSEC algorithm '{name}'"),
            Self::WrongAlgorithmCount(count) => write!(
                f,
                "'algorithms' must name exactly two algorithm specs, found {count}"
            ),
        }
    }
}

//----------- KeyringError -------------------------------------------------------

/// A fatal error while loading or saving a [`crate::keys::keyring::KeyRing`].
///
/// A missing keyring file is *not* represented here: it is handled by
/// [`crate::keys::keyring::KeyRing::new`] as "generate fresh", per spec §4.2.
#[derive(Debug)]
pub enum KeyringError {
    /// The keyring file could not be read or written.
    Io(Utf8PathBuf, String),
    /// The keyring JSON was malformed, or a private key within it could not
    /// be parsed.
    Malformed(Utf8PathBuf, String),
}

impl std::error::Error for KeyringError {}

impl fmt::Display for KeyringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(path, reason) => write!(f, "'{path}': {reason}"),
            Self::Malformed(path, reason) => write!(f, "malformed keyring '{path}': {reason}"),
        }
    }
}

//----------- SigningError -------------------------------------------------------

/// An error that occurred during a single tick of the signing driver.
#[derive(Debug)]
pub enum SigningError {
    /// The unsigned zone could not be loaded or parsed.
    ZoneLoad(Utf8PathBuf, String),
    /// The keyring could not be generated, updated, rotated or persisted.
    Keyring(KeyringError),
    /// The external DNSSEC signing library rejected the zone or a key.
    Crypto(String),
    /// The signed zone, trust anchors, or dashboard could not be written.
    Io(Utf8PathBuf, String),
}

impl std::error::Error for SigningError {}

impl fmt::Display for SigningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZoneLoad(path, reason) => write!(f, "failed to load zone '{path}': {reason}"),
            Self::Keyring(err) => write!(f, "keyring error: {err}"),
            Self::Crypto(reason) => write!(f, "signing failed: {reason}"),
            Self::Io(path, reason) => write!(f, "failed to write '{path}': {reason}"),
        }
    }
}

impl From<KeyringError> for SigningError {
    fn from(err: KeyringError) -> Self {
        Self::Keyring(err)
    }
}

impl SigningError {
    /// Whether this tick's failure should be treated as transient when the
    /// driver is run with `--loop` (spec §7): only a zone load/parse
    /// failure is forgiven; keyring corruption and crypto failures are
    /// always fatal.
    pub fn is_benign_in_loop(&self) -> bool {
        matches!(self, Self::ZoneLoad(..))
    }
}
