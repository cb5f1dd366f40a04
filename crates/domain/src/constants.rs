//! Domain-level constants.

/// Prefix for the positional alias of each sub-operation (`op_0`, `op_1`, ...).
pub const ALIAS_PREFIX: &str = "op_";

/// Payload field used as the remote item name.
pub const ITEM_NAME_FIELD: &str = "name";

/// Maximum stored length of a record's `error_message`.
pub const MAX_ERROR_MESSAGE_LEN: usize = 512;

/// Separator used when joining failure reasons into a batch `error_summary`.
pub const ERROR_SUMMARY_SEPARATOR: &str = "; ";

/// `batch_type` recorded when staged candidates mix several operations.
pub const MIXED_BATCH_TYPE: &str = "MIXED";
