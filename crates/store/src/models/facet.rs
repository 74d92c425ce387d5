use fingerprint_core::FacetEntry;

/// One serialized facet entry of a fingerprint.
#[derive(Debug, Clone, Eq, PartialEq, sqlx::FromRow)]
pub struct FacetRow {
    pub(crate) facet_name: String,
    pub(crate) facet_entry: String,
    pub(crate) deletion_blocked: bool,
}
impl From<FacetEntry> for FacetRow {
    fn from(entry: FacetEntry) -> Self {
        Self { facet_name: entry.name, facet_entry: entry.entry, deletion_blocked: entry.deletion_blocked }
    }
}
impl From<FacetRow> for FacetEntry {
    fn from(row: FacetRow) -> Self {
        Self { name: row.facet_name, entry: row.facet_entry, deletion_blocked: row.deletion_blocked }
    }
}
