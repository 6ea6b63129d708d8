//! The signing driver (spec §4.4, §5): the loop that, per tick, advances
//! `(quarter, slot)`, asks the [`KeyRing`] to regenerate and recompute its
//! flags, hands the zone and the active keys to `domain`'s signing code, and
//! persists the result.
//!
//! Grounded on cascade's `units/zone_signer.rs` for the `domain`-crate
//! signing calls (`GenerateRrsigConfig`, `sign_sorted_zone_records`) and on
//! `rollercoaster/signer.py::main` for the tick's control flow and ordering;
//! simplified to a single-threaded loop over a single zone, matching spec §5
//! ("single-threaded cooperative... no parallelism").

use std::process::Command;
use std::thread;
use std::time::SystemTime;

use camino::Utf8Path;
use domain::base::iana::Class;
use domain::base::name::FlattenInto;
use domain::base::{CanonicalOrd, Name, Record, Ttl};
use domain::dnssec::sign::keys::SigningKey;
use domain::dnssec::sign::records::RecordsIter;
use domain::dnssec::sign::signatures::rrsigs::{sign_sorted_zone_records, GenerateRrsigConfig};
use domain::rdata::dnssec::Timestamp;
use domain::rdata::ZoneRecordData;
use domain::zonefile::inplace;

use crate::anchors;
use crate::config::Config;
use crate::dashboard;
use crate::error::SigningError;
use crate::keys::keyring::KeyRing;
use crate::keys::schedule::{current_quarter_slot, next_slot_boundary};
use crate::util;

/// An owned domain name, matching the octets type this crate loads zone
/// records into. The zone tree / AXFR machinery `domain`'s `zonetree`
/// feature offers is out of scope here: a single flat zone file is read,
/// signed in memory, and written back out.
pub type OwnedName = Name<Vec<u8>>;

/// A single zone record, before or after signing.
pub type OwnedRecord = Record<OwnedName, ZoneRecordData<Vec<u8>, OwnedName>>;

/// The signing driver: owns the configuration and the live [`KeyRing`]
/// across ticks.
pub struct SigningDriver {
    config: Config,
    keyring: KeyRing,
}

impl SigningDriver {
    /// Loads (or generates) the keyring named by `config.keyring` and
    /// constructs a driver ready to tick.
    pub fn new(config: Config) -> Result<Self, SigningError> {
        let keyring = KeyRing::new(config.algorithms, &config.keyring)?;
        Ok(SigningDriver { config, keyring })
    }

    /// Runs a single tick at the (quarter, slot) derived from `now` (spec
    /// §4.4 steps 1-8).
    pub fn tick(&mut self, now: SystemTime) -> Result<(), SigningError> {
        let (quarter, slot) = current_quarter_slot(now, self.config.delta.duration());
        tracing::info!("starting tick at quarter {quarter}, slot {slot}");

        self.keyring
            .generate(quarter, slot)
            .map_err(|e| SigningError::Crypto(e.to_string()))?;
        self.keyring.update(quarter, slot, self.config.mode);

        let origin: OwnedName = self.config.origin.parse().map_err(|e| {
            SigningError::ZoneLoad(self.config.zone_unsigned.clone(), format!("invalid origin: {e}"))
        })?;

        let mut records = load_zone(&self.config.zone_unsigned, &origin)?;
        if let Some(hints_path) = &self.config.hints {
            // Passed through to the zone loader unmodified: parsed the same
            // way as the primary zone file and merged in before signing, so
            // configured glue/referral records get covered by this tick's
            // RRSIGs exactly like any other RRset.
            records.extend(load_zone(hints_path, &origin)?);
        }

        let publish = self.keyring.publish_set();
        let sign = self.keyring.sign_set();
        for key in &publish {
            tracing::debug!("publishing DNSKEY for '{}'", key.name());
        }
        for key in &sign {
            tracing::debug!("signing with '{}'", key.name());
        }

        let dnskey_ttl = Ttl::from_secs(self.config.dnskey_ttl.duration().as_secs() as u32);
        for key in &publish {
            records.push(Record::new(
                origin.clone(),
                Class::IN,
                dnskey_ttl,
                ZoneRecordData::Dnskey(key.dnskey()),
            ));
        }
        records.sort_by(CanonicalOrd::canonical_cmp);

        let mut signing_keys = Vec::with_capacity(sign.len());
        for key in &sign {
            let crypto_key = key
                .crypto_key_pair()
                .map_err(|e| SigningError::Crypto(e.to_string()))?;
            signing_keys.push(SigningKey::new(origin.clone(), key.dnskey().flags(), crypto_key));
        }
        let key_refs: Vec<_> = signing_keys.iter().collect();

        let now_secs = Timestamp::now().into_int();
        let lifetime_secs = self.config.lifetime.duration().as_secs() as u32;
        let inception = now_secs.wrapping_sub(3600);
        let expiration = now_secs.wrapping_add(lifetime_secs);
        let rrsig_config = GenerateRrsigConfig::new(inception.into(), expiration.into());

        let signatures = sign_sorted_zone_records(
            &origin,
            RecordsIter::new(&records),
            &key_refs,
            &rrsig_config,
        )
        .map_err(|e| SigningError::Crypto(e.to_string()))?;

        for signature in signatures {
            records.push(Record::new(
                signature.owner().clone(),
                signature.class(),
                signature.ttl(),
                ZoneRecordData::Rrsig(signature.data().clone()),
            ));
        }
        records.sort_by(CanonicalOrd::canonical_cmp);

        write_zone(&self.config.zone_signed, &records)?;
        self.keyring.save()?;

        if let Some(path) = &self.config.anchors {
            anchors::write_trust_anchors(path, &self.keyring, &origin)?;
        }
        if let Some(path) = &self.config.dashboard {
            dashboard::write_text_dashboard(path, &self.keyring, self.config.mode)?;
        }

        if (quarter, slot) == (4, 9) {
            tracing::info!("year boundary reached, rotating algorithm slots");
            self.keyring.rotate();
        }

        if let Some(command) = &self.config.reload {
            maybe_reload_zone(command);
        }

        Ok(())
    }

    /// Runs exactly one tick, for `--once` invocations.
    pub fn run_once(&mut self) -> Result<(), SigningError> {
        self.tick(SystemTime::now())
    }

    /// Runs ticks forever, sleeping between them until the next slot
    /// boundary (spec §4.4 step 9, §5 "suspension points").
    ///
    /// Per spec §7, a zone load/parse failure is non-fatal here: it is
    /// logged and the driver proceeds to the next tick. Every other failure
    /// class is fatal and returned to the caller.
    pub fn run_loop(&mut self) -> Result<(), SigningError> {
        loop {
            let now = SystemTime::now();
            if let Err(err) = self.tick(now) {
                if err.is_benign_in_loop() {
                    tracing::error!("tick failed on a transient zone error, continuing: {err}");
                } else {
                    return Err(err);
                }
            }

            let boundary = next_slot_boundary(SystemTime::now(), self.config.delta.duration());
            if let Ok(remaining) = boundary.duration_since(SystemTime::now()) {
                thread::sleep(remaining);
            }
        }
    }
}

/// Loads every record from the unsigned zone file at `path`, skipping any
/// DNSSEC records left over from a previous signing run (DNSKEY, RRSIG,
/// NSEC, NSEC3): the driver regenerates all of these itself every tick.
fn load_zone(path: &Utf8Path, origin: &OwnedName) -> Result<Vec<OwnedRecord>, SigningError> {
    use std::io::Write;

    let bytes =
        std::fs::read(path).map_err(|e| SigningError::ZoneLoad(path.to_owned(), e.to_string()))?;

    let mut writer = inplace::Zonefile::with_capacity(bytes.len()).writer();
    writer
        .write_all(&bytes)
        .map_err(|e| SigningError::ZoneLoad(path.to_owned(), e.to_string()))?;
    let mut reader = writer.into_inner();
    reader.set_origin(origin.clone());
    reader.set_default_class(Class::IN);

    let mut records = Vec::new();
    loop {
        let entry = reader
            .next_entry()
            .map_err(|e| SigningError::ZoneLoad(path.to_owned(), e.to_string()))?;
        let Some(entry) = entry else { break };
        let record: OwnedRecord = match entry {
            inplace::Entry::Record(record) => record.flatten_into(),
            inplace::Entry::Include { .. } => {
                return Err(SigningError::ZoneLoad(
                    path.to_owned(),
                    "zonefile include directives are not supported".to_owned(),
                ));
            }
        };

        if matches!(
            record.data(),
            ZoneRecordData::Dnskey(_)
                | ZoneRecordData::Rrsig(_)
                | ZoneRecordData::Nsec(_)
                | ZoneRecordData::Nsec3(_)
        ) {
            continue;
        }
        records.push(record);
    }

    Ok(records)
}

/// Writes `records` as zone-file text to `path`, atomically (spec §5, §6).
fn write_zone(path: &Utf8Path, records: &[OwnedRecord]) -> Result<(), SigningError> {
    let mut out = String::new();
    for record in records {
        out.push_str(&record.to_string());
        out.push('\n');
    }
    util::write_file(path, out.as_bytes()).map_err(|e| SigningError::Io(path.to_owned(), e.to_string()))
}

/// Runs the configured `reload` command after a signed zone is written.
/// Failure is non-fatal (spec §6 "reload"; §7 general policy that I/O at
/// the edges of a tick is not part of the state machine's own failure
/// modes): a broken `rndc reload` should not stop the next tick's signing.
fn maybe_reload_zone(command: &str) {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        return;
    };
    match Command::new(program).args(parts).status() {
        Ok(status) if status.success() => {
            tracing::debug!("ran reload command '{command}'");
        }
        Ok(status) => {
            tracing::warn!("reload command '{command}' exited with {status}");
        }
        Err(err) => {
            tracing::warn!("failed to run reload command '{command}': {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use domain::base::iana::SecAlg;

    use super::*;
    use crate::keys::keyring::KeySpec;
    use crate::keys::rollover::RolloverPolicy;

    fn config(dir: &camino::Utf8Path) -> Config {
        Config {
            delta: crate::common::datetime::TimeSpan::from_secs(10),
            keyring: dir.join("keyring.json"),
            zone_unsigned: dir.join("example.zone"),
            zone_signed: dir.join("example.zone.signed"),
            origin: "example.".to_owned(),
            mode: RolloverPolicy::DoubleSigner,
            algorithms: [
                KeySpec {
                    algorithm: SecAlg::ECDSAP256SHA256,
                    key_size: None,
                },
                KeySpec {
                    algorithm: SecAlg::ED25519,
                    key_size: None,
                },
            ],
            dnskey_ttl: crate::common::datetime::TimeSpan::from_secs(3600),
            lifetime: crate::common::datetime::TimeSpan::from_secs(30 * 24 * 3600),
            anchors: Some(dir.join("anchors.txt")),
            dashboard: Some(dir.join("dashboard.txt")),
            reload: None,
            hints: None,
        }
    }

    #[test]
    fn tick_signs_and_persists_a_minimal_zone() {
        let dir = tempfile::tempdir().unwrap();
        let dir = camino::Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap();
        std::fs::write(
            dir.join("example.zone"),
            "example. 3600 IN SOA ns.example. hostmaster.example. 1 3600 900 604800 3600\n\
             example. 3600 IN NS ns.example.\n\
             ns.example. 3600 IN A 192.0.2.1\n",
        )
        .unwrap();

        let cfg = config(&dir);
        let mut driver = SigningDriver::new(cfg).unwrap();
        driver.tick(UNIX_EPOCH + Duration::from_secs(0)).unwrap();

        let signed = std::fs::read_to_string(dir.join("example.zone.signed")).unwrap();
        assert!(signed.contains("DNSKEY"));
        assert!(signed.contains("RRSIG"));

        let anchors = std::fs::read_to_string(dir.join("anchors.txt")).unwrap();
        assert!(anchors.contains("DS"));

        let dashboard = std::fs::read_to_string(dir.join("dashboard.txt")).unwrap();
        assert!(dashboard.contains("Algorithm 1, ksk"));
    }

    #[test]
    fn tick_merges_hints_records_into_the_signed_zone() {
        let dir = tempfile::tempdir().unwrap();
        let dir = camino::Utf8PathBuf::from_path_buf(dir.path().to_owned()).unwrap();
        std::fs::write(
            dir.join("example.zone"),
            "example. 3600 IN SOA ns.example. hostmaster.example. 1 3600 900 604800 3600\n\
             example. 3600 IN NS ns.example.\n\
             ns.example. 3600 IN A 192.0.2.1\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("hints.zone"),
            "extra.example. 3600 IN A 192.0.2.2\n",
        )
        .unwrap();

        let mut cfg = config(&dir);
        cfg.hints = Some(dir.join("hints.zone"));
        let mut driver = SigningDriver::new(cfg).unwrap();
        driver.tick(UNIX_EPOCH + Duration::from_secs(0)).unwrap();

        let signed = std::fs::read_to_string(dir.join("example.zone.signed")).unwrap();
        assert!(signed.contains("extra.example."));
    }
}
