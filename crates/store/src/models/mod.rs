//! Relational mapping for fingerprints.
//!
//! A fingerprint spans three tables: one header row, one row per
//! `(job, build)` usage and one row per facet entry. The row types here are
//! what the store reads and writes; [`from_rows`] puts them back together.

mod facet;
mod header;
mod usage;

pub use self::facet::FacetRow;
pub use self::header::HeaderRow;
pub use self::usage::UsageRow;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use fingerprint_core::facet as codec;
use fingerprint_core::{Fingerprint, FingerprintHash};

pub(crate) fn to_header_row(fingerprint: &Fingerprint) -> Result<HeaderRow> {
    HeaderRow::try_from(fingerprint)
}

pub(crate) fn to_usage_rows(fingerprint: &Fingerprint) -> Vec<UsageRow> {
    fingerprint
        .usages
        .iter()
        .flat_map(|(job, builds)| {
            builds.iter().map(move |number| UsageRow { job_name: job.clone(), build_number: i64::from(number) })
        })
        .collect()
}

pub(crate) fn to_facet_rows(fingerprint: &Fingerprint) -> Result<Vec<FacetRow>> {
    let entries = codec::extract_facets(fingerprint).or_raise(|| ErrorKind::DataFormat("facet entry"))?;
    Ok(entries.into_iter().map(FacetRow::from).collect())
}

/// Reassemble a fingerprint from its header, usage and facet rows.
pub(crate) fn from_rows(header: HeaderRow, usages: Vec<UsageRow>, facets: Vec<FacetRow>) -> Result<Fingerprint> {
    let mut fingerprint = Fingerprint::try_from(header)?;
    for usage in usages {
        let number = u32::try_from(usage.build_number).or_raise(|| ErrorKind::DataFormat("build number"))?;
        fingerprint.add_usage(usage.job_name, number);
    }
    let entries: Vec<_> = facets.into_iter().map(Into::into).collect();
    fingerprint.facets = codec::decode_facets(&entries).or_raise(|| ErrorKind::DataFormat("facet entry"))?;
    Ok(fingerprint)
}

pub(crate) fn parse_hash(hash: &str) -> Result<FingerprintHash> {
    hash.parse::<FingerprintHash>().or_raise(|| ErrorKind::DataFormat("hash"))
}
