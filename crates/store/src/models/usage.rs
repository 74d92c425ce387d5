/// One `(job, build)` usage of a fingerprint.
#[derive(Debug, Clone, Eq, PartialEq, sqlx::FromRow)]
pub struct UsageRow {
    pub(crate) job_name: String,
    pub(crate) build_number: i64,
}
