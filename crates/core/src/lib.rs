//! Fingerprint domain model.
//!
//! A fingerprint records which builds produced or consumed a file,
//! identified by the file's content hash. This crate holds the in-memory
//! model plus the two encodings storage relies on:
//! - [`RangeSet`] collapses runs of build numbers into `"3-5,33"`.
//! - [`facet`] flattens polymorphic facet payloads into serialized entries
//!   and back.

pub mod error;
pub mod facet;
mod fingerprint;
mod instance;
mod range;

pub use crate::facet::{Facet, FacetEntry};
pub use crate::fingerprint::{BuildPtr, Fingerprint, FingerprintHash};
pub use crate::instance::InstanceId;
pub use crate::range::RangeSet;
