use crate::error::{ErrorKind, Result};
use crate::facet::Facet;
use crate::range::RangeSet;
use exn::ResultExt;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use time::UtcDateTime;

/// MD5-sized content digest identifying an artifact.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FingerprintHash([u8; 16]);

impl FingerprintHash {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase, 32 hex digits.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for FingerprintHash {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes).or_raise(|| ErrorKind::InvalidHash(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for FingerprintHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FingerprintHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FingerprintHash({self})")
    }
}

/// Points at one build of one job.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct BuildPtr {
    pub name: String,
    pub number: u32,
}

impl BuildPtr {
    pub fn new(name: impl Into<String>, number: u32) -> Self {
        Self { name: name.into(), number }
    }
}

/// Identity record for a file, and every build that touched it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub hash: FingerprintHash,
    /// Always whole microseconds; see [`Fingerprint::with_timestamp`].
    timestamp: UtcDateTime,
    pub filename: String,
    /// The build that first recorded this file, when known.
    pub original: Option<BuildPtr>,
    /// Job name to the builds of that job that used the file.
    pub usages: BTreeMap<String, RangeSet>,
    pub facets: Vec<Facet>,
}

impl Fingerprint {
    /// A new fingerprint stamped with the current time.
    pub fn new(hash: FingerprintHash, filename: impl Into<String>, original: Option<BuildPtr>) -> Self {
        Self {
            hash,
            timestamp: truncate_to_micros(UtcDateTime::now()),
            filename: filename.into(),
            original,
            usages: BTreeMap::new(),
            facets: Vec::new(),
        }
    }

    /// Replace the creation time.
    ///
    /// Sub-microsecond precision is dropped, as relational timestamp columns
    /// cannot hold it and a stored fingerprint must load back unchanged.
    pub fn with_timestamp(mut self, timestamp: UtcDateTime) -> Self {
        self.timestamp = truncate_to_micros(timestamp);
        self
    }

    pub fn timestamp(&self) -> UtcDateTime {
        self.timestamp
    }

    /// Record that `job` build `number` used this file.
    pub fn add_usage(&mut self, job: impl Into<String>, number: u32) {
        self.usages.entry(job.into()).or_default().insert(number);
    }

    pub fn usage(&self, job: &str) -> Option<&RangeSet> {
        self.usages.get(job)
    }

    pub fn add_facet(&mut self, facet: Facet) {
        self.facets.push(facet);
    }

    /// Whether any facet forbids deleting this fingerprint.
    pub fn is_deletion_blocked(&self) -> bool {
        self.facets.iter().any(|facet| facet.deletion_blocked)
    }

    /// Whether the original build or any recorded usage still exists.
    pub fn is_alive(&self, mut is_build_alive: impl FnMut(&str, u32) -> bool) -> bool {
        if let Some(original) = &self.original
            && is_build_alive(&original.name, original.number)
        {
            return true;
        }
        self.usages.iter().any(|(job, builds)| builds.iter().any(|number| is_build_alive(job, number)))
    }

    /// Forget usages whose builds no longer exist, dropping jobs left empty.
    ///
    /// Returns `true` if anything was removed.
    pub fn trim(&mut self, mut is_build_alive: impl FnMut(&str, u32) -> bool) -> bool {
        let mut changed = false;
        self.usages.retain(|job, builds| {
            changed |= builds.retain(|number| is_build_alive(job, number));
            !builds.is_empty()
        });
        changed
    }
}

fn truncate_to_micros(timestamp: UtcDateTime) -> UtcDateTime {
    // Only fails for an out-of-range microsecond, which `microsecond()` never returns.
    timestamp.replace_microsecond(timestamp.microsecond()).unwrap_or(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const HASH: &str = "d41d8cd98f00b204e9800998ecf8427e";

    #[test]
    fn test_hash_round_trips_through_hex() {
        let hash: FingerprintHash = HASH.parse().unwrap();
        assert_eq!(hash.to_string(), HASH);
        assert_eq!(hash.as_bytes()[0], 0xd4);
        let upper: FingerprintHash = HASH.to_uppercase().parse().unwrap();
        assert_eq!(upper, hash);
    }

    #[rstest]
    #[case("")]
    #[case("d41d8cd98f00b204e9800998ecf8427")]
    #[case("d41d8cd98f00b204e9800998ecf8427e00")]
    #[case("z41d8cd98f00b204e9800998ecf8427e")]
    fn test_hash_rejects_bad_input(#[case] input: &str) {
        let err = input.parse::<FingerprintHash>().unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidHash(input.to_string()));
    }

    #[test]
    fn test_timestamps_are_whole_microseconds() {
        let precise = UtcDateTime::new(
            time::Date::from_calendar_date(2024, time::Month::May, 6).unwrap(),
            time::Time::from_hms_nano(7, 8, 9, 123_456_789).unwrap(),
        );
        let fingerprint = Fingerprint::new(HASH.parse().unwrap(), "foo.jar", None).with_timestamp(precise);
        assert_eq!(fingerprint.timestamp().nanosecond(), 123_456_000);
        assert_eq!(fingerprint.timestamp().date(), precise.date());

        let fresh = Fingerprint::new(HASH.parse().unwrap(), "foo.jar", None);
        assert_eq!(fresh.timestamp().nanosecond() % 1_000, 0);
    }

    #[test]
    fn test_usages_collapse_duplicates() {
        let mut fingerprint = Fingerprint::new(HASH.parse().unwrap(), "foo.jar", None);
        fingerprint.add_usage("a", 3);
        fingerprint.add_usage("a", 3);
        fingerprint.add_usage("a", 4);
        fingerprint.add_usage("b", 1);
        assert_eq!(fingerprint.usage("a").map(RangeSet::encode).as_deref(), Some("3-4"));
        assert_eq!(fingerprint.usages.len(), 2);
        assert!(fingerprint.usage("c").is_none());
    }

    #[test]
    fn test_trim_drops_dead_builds_and_empty_jobs() {
        let mut fingerprint = Fingerprint::new(HASH.parse().unwrap(), "foo.jar", Some(BuildPtr::new("up", 1)));
        fingerprint.add_usage("a", 1);
        fingerprint.add_usage("a", 2);
        fingerprint.add_usage("b", 7);

        assert!(fingerprint.trim(|job, number| job == "a" && number == 2));
        assert_eq!(fingerprint.usage("a").map(RangeSet::encode).as_deref(), Some("2"));
        assert!(fingerprint.usage("b").is_none());
        assert!(!fingerprint.trim(|_, _| true));
    }

    #[test]
    fn test_liveness() {
        let mut fingerprint = Fingerprint::new(HASH.parse().unwrap(), "foo.jar", Some(BuildPtr::new("up", 1)));
        assert!(fingerprint.is_alive(|job, _| job == "up"));
        assert!(!fingerprint.is_alive(|_, _| false));
        fingerprint.add_usage("a", 5);
        assert!(fingerprint.is_alive(|job, number| job == "a" && number == 5));
    }

    #[test]
    fn test_deletion_blocked_by_any_facet() {
        let mut fingerprint = Fingerprint::new(HASH.parse().unwrap(), "foo.jar", None);
        fingerprint.add_facet(Facet::new("Plain", serde_json::Value::Null));
        assert!(!fingerprint.is_deletion_blocked());
        fingerprint.add_facet(Facet::new("Keep", serde_json::Value::Null).blocking_deletion());
        assert!(fingerprint.is_deletion_blocked());
    }
}
