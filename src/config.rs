//! Driver configuration, loaded from a TOML file (spec §6).

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::common::datetime::TimeSpan;
use crate::error::ConfigError;
use crate::keys::keyring::KeySpec;
use crate::keys::rollover::RolloverPolicy;

//----------- Config --------------------------------------------------------

/// The fully parsed and validated driver configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Duration of a single slot, e.g. `3600` or `"1h"`.
    pub delta: TimeSpan,

    /// Path to the persisted keyring JSON.
    pub keyring: Utf8PathBuf,

    /// The unsigned source zone.
    pub zone_unsigned: Utf8PathBuf,

    /// Where the signed zone is written.
    pub zone_signed: Utf8PathBuf,

    /// The zone's origin name, e.g. `"example."`.
    pub origin: String,

    /// Which rollover state machine to run.
    pub mode: RolloverPolicy,

    /// The two algorithm slots: index 0 is "current", index 1 is
    /// "incoming" (spec §3).
    pub algorithms: [KeySpec; 2],

    /// TTL to use for published DNSKEY records.
    pub dnskey_ttl: TimeSpan,

    /// Signature validity period.
    pub lifetime: TimeSpan,

    /// Where to write a trust-anchor (DS) file, if at all.
    pub anchors: Option<Utf8PathBuf>,

    /// Where to write a rendered text dashboard, if at all.
    pub dashboard: Option<Utf8PathBuf>,

    /// A shell command to invoke after each signed zone is written, e.g.
    /// `"rndc reload example"`.
    pub reload: Option<String>,

    /// Optional path to a zone file of supplementary records (e.g. glue),
    /// parsed the same way as `zone.unsigned` and merged in before signing.
    pub hints: Option<Utf8PathBuf>,
}

impl Config {
    /// Loads and validates the configuration file at `path`.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_owned(), e.to_string()))?;
        let raw: RawConfig =
            toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_owned(), e.to_string()))?;
        raw.build()
    }
}

//----------- RawConfig ------------------------------------------------------

/// The on-disk TOML shape, converted into [`Config`] by [`RawConfig::build`].
///
/// Mirrors the teacher's `Spec`/`build()` convention (cascade's
/// `policy/file/v1.rs`): the raw, serde-derived struct stays close to the
/// TOML text, while validation and enum resolution happen in a separate
/// step that can fail with a [`ConfigError`].
#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    delta: TimeSpan,
    keyring: Utf8PathBuf,
    zone: RawZone,
    mode: String,
    algorithms: Vec<RawKeySpec>,
    #[serde(default = "default_dnskey_ttl")]
    dnskey_ttl: TimeSpan,
    #[serde(default = "default_lifetime")]
    lifetime: TimeSpan,
    #[serde(default)]
    anchors: Option<Utf8PathBuf>,
    #[serde(default)]
    dashboard: Option<Utf8PathBuf>,
    #[serde(default)]
    reload: Option<String>,
    #[serde(default)]
    hints: Option<Utf8PathBuf>,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawZone {
    unsigned: Utf8PathBuf,
    signed: Utf8PathBuf,
    origin: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawKeySpec {
    algorithm: String,
    #[serde(default)]
    key_size: Option<u16>,
}

fn default_dnskey_ttl() -> TimeSpan {
    TimeSpan::from_secs(3600)
}

fn default_lifetime() -> TimeSpan {
    TimeSpan::from_secs(30 * 24 * 3600)
}

impl RawConfig {
    fn build(self) -> Result<Config, ConfigError> {
        let mode = match self.mode.as_str() {
            "double" => RolloverPolicy::DoubleSigner,
            "single" => RolloverPolicy::SingleSigner,
            "hybrid" => RolloverPolicy::Hybrid,
            other => return Err(ConfigError::UnknownMode(other.to_owned())),
        };

        let count = self.algorithms.len();
        let [a0, a1]: [RawKeySpec; 2] = self
            .algorithms
            .try_into()
            .map_err(|_| ConfigError::WrongAlgorithmCount(count))?;

        let algorithms = [parse_key_spec(a0)?, parse_key_spec(a1)?];

        Ok(Config {
            delta: self.delta,
            keyring: self.keyring,
            zone_unsigned: self.zone.unsigned,
            zone_signed: self.zone.signed,
            origin: self.zone.origin,
            mode,
            algorithms,
            dnskey_ttl: self.dnskey_ttl,
            lifetime: self.lifetime,
            anchors: self.anchors,
            dashboard: self.dashboard,
            reload: self.reload,
            hints: self.hints,
        })
    }
}

fn parse_key_spec(raw: RawKeySpec) -> Result<KeySpec, ConfigError> {
    let algorithm = crate::keys::keypair::algorithm_from_name(&raw.algorithm)
        .ok_or_else(|| ConfigError::UnknownAlgorithm(raw.algorithm.clone()))?;
    Ok(KeySpec {
        algorithm,
        key_size: raw.key_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
            delta = 3600
            keyring = "keyring.json"
            mode = "double"

            [zone]
            unsigned = "example.zone"
            signed = "example.zone.signed"
            origin = "example."

            [[algorithms]]
            algorithm = "RSASHA256"
            key-size = 2048

            [[algorithms]]
            algorithm = "ECDSAP256SHA256"
        "#;
        let raw: RawConfig = toml::from_str(toml).unwrap();
        let cfg = raw.build().unwrap();
        assert_eq!(cfg.delta, TimeSpan::from_secs(3600));
        assert_eq!(cfg.dnskey_ttl, TimeSpan::from_secs(3600));
        assert_eq!(cfg.origin, "example.");
        assert!(matches!(cfg.mode, RolloverPolicy::DoubleSigner));
    }

    #[test]
    fn rejects_unknown_mode() {
        let toml = r#"
            delta = 3600
            keyring = "keyring.json"
            mode = "triple"

            [zone]
            unsigned = "example.zone"
            signed = "example.zone.signed"
            origin = "example."

            [[algorithms]]
            algorithm = "RSASHA256"
            [[algorithms]]
            algorithm = "ECDSAP256SHA256"
        "#;
        let raw: RawConfig = toml::from_str(toml).unwrap();
        assert!(matches!(raw.build(), Err(ConfigError::UnknownMode(_))));
    }

    #[test]
    fn rejects_wrong_algorithm_count() {
        let toml = r#"
            delta = 3600
            keyring = "keyring.json"
            mode = "double"

            [zone]
            unsigned = "example.zone"
            signed = "example.zone.signed"
            origin = "example."

            [[algorithms]]
            algorithm = "RSASHA256"
        "#;
        let raw: RawConfig = toml::from_str(toml).unwrap();
        assert!(matches!(
            raw.build(),
            Err(ConfigError::WrongAlgorithmCount(1))
        ));
    }

    #[test]
    fn accepts_human_readable_durations() {
        let toml = r#"
            delta = "1h"
            keyring = "keyring.json"
            mode = "single"
            dnskey-ttl = "2h"
            lifetime = "30d"

            [zone]
            unsigned = "example.zone"
            signed = "example.zone.signed"
            origin = "example."

            [[algorithms]]
            algorithm = "RSASHA256"
            [[algorithms]]
            algorithm = "ED25519"
        "#;
        let raw: RawConfig = toml::from_str(toml).unwrap();
        let cfg = raw.build().unwrap();
        assert_eq!(cfg.delta, TimeSpan::from_secs(3600));
        assert_eq!(cfg.dnskey_ttl, TimeSpan::from_secs(2 * 3600));
        assert_eq!(cfg.lifetime, TimeSpan::from_secs(30 * 24 * 3600));
    }
}
