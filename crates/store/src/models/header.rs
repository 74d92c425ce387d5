use crate::error::{Error, ErrorKind};
use crate::models::parse_hash;
use exn::ResultExt;
use fingerprint_core::{BuildPtr, Fingerprint};
use time::{PrimitiveDateTime, UtcDateTime};

/// The `fingerprint` table row. Scoped by instance, which is bound
/// separately.
#[derive(Debug, Clone, Eq, PartialEq, sqlx::FromRow)]
pub struct HeaderRow {
    pub(crate) hash: String,
    /// UTC, stored without a zone.
    pub(crate) timestamp: PrimitiveDateTime,
    pub(crate) filename: String,
    pub(crate) original_job_name: Option<String>,
    pub(crate) original_job_build: Option<i64>,
}
impl TryFrom<&Fingerprint> for HeaderRow {
    type Error = Error;
    fn try_from(fingerprint: &Fingerprint) -> Result<Self, Self::Error> {
        let timestamp = fingerprint.timestamp();
        let original = fingerprint.original.as_ref();
        Ok(Self {
            hash: fingerprint.hash.to_hex(),
            timestamp: PrimitiveDateTime::new(timestamp.date(), timestamp.time()),
            filename: fingerprint.filename.clone(),
            original_job_name: original.map(|ptr| ptr.name.clone()),
            original_job_build: original.map(|ptr| i64::from(ptr.number)),
        })
    }
}
impl TryFrom<HeaderRow> for Fingerprint {
    type Error = Error;
    fn try_from(row: HeaderRow) -> Result<Self, Self::Error> {
        let original = match (row.original_job_name, row.original_job_build) {
            (None, None) => None,
            (Some(name), Some(number)) => Some(BuildPtr::new(
                name,
                u32::try_from(number).or_raise(|| ErrorKind::DataFormat("original build number"))?,
            )),
            _ => exn::bail!(ErrorKind::DataFormat("original build")),
        };
        let timestamp = UtcDateTime::new(row.timestamp.date(), row.timestamp.time());
        Ok(Fingerprint::new(parse_hash(&row.hash)?, row.filename, original).with_timestamp(timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    fn row(name: Option<&str>, build: Option<i64>) -> HeaderRow {
        HeaderRow {
            hash: "0123456789abcdef0123456789abcdef".to_string(),
            timestamp: datetime!(2024-05-06 07:08:09),
            filename: "foo.jar".to_string(),
            original_job_name: name.map(str::to_string),
            original_job_build: build,
        }
    }

    #[test]
    fn test_row_to_model() {
        let model = Fingerprint::try_from(row(Some("upstream"), Some(12))).unwrap();
        assert_eq!(model.hash.to_hex(), "0123456789abcdef0123456789abcdef");
        assert_eq!(model.filename, "foo.jar");
        assert_eq!(model.original, Some(BuildPtr::new("upstream", 12)));
        assert_eq!(model.timestamp(), datetime!(2024-05-06 07:08:09).as_utc());
        assert!(model.usages.is_empty());
        assert!(model.facets.is_empty());
    }

    #[test]
    fn test_model_to_row() {
        let model = Fingerprint::try_from(row(None, None)).unwrap();
        let row = HeaderRow::try_from(&model).unwrap();
        assert_eq!(row.timestamp, datetime!(2024-05-06 07:08:09));
        assert_eq!(row.original_job_name, None);
        assert_eq!(row.original_job_build, None);
    }

    #[rstest]
    #[case(Some("upstream"), None, "original build")]
    #[case(None, Some(12), "original build")]
    #[case(Some("upstream"), Some(-3), "original build number")]
    fn test_inconsistent_original_is_rejected(
        #[case] name: Option<&str>,
        #[case] build: Option<i64>,
        #[case] what: &'static str,
    ) {
        let err = Fingerprint::try_from(row(name, build)).unwrap_err();
        assert_eq!(*err, ErrorKind::DataFormat(what));
    }

    #[test]
    fn test_malformed_hash_is_rejected() {
        let mut row = row(None, None);
        row.hash = "not-a-hash".to_string();
        let err = Fingerprint::try_from(row).unwrap_err();
        assert_eq!(*err, ErrorKind::DataFormat("hash"));
    }
}
