/// Dense, write-ordered identifier of a record.
///
/// Ids start at 0 and grow by one for every accepted write. They are never
/// reused, so an id doubles as the record's slot in the key table.
pub type RecordId = u64;
