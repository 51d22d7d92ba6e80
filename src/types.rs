/// The version of an aggregate record, within its specific aggregate
/// instance.
///
/// Starts at 0 on creation and advances by exactly 1 on every successful
/// repository update. Stored as a numeric attribute; never negative.
pub type Version = i64;
