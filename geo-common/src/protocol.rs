//! # Protocol Constants
//!
//! Command names and literal server messages the client relies on.

/// Mode-selection command sent on every new connection.
pub const OUTPUT_COMMAND: &str = "OUTPUT";

/// Argument to [`OUTPUT_COMMAND`] selecting JSON replies.
pub const OUTPUT_JSON: &str = "json";

/// Server error text for a missing entity. Single-entity lookups turn this
/// one message into an absent value.
pub const ID_NOT_FOUND: &str = "id not found";

/// Every top-level key a reply or push event may carry.
pub const REPLY_KEYS: [&str; 17] = [
    "ok", "id", "object", "ids", "objects", "fields", "count", "cursor", "ttl", "err", "elapsed",
    "live", "command", "group", "detect", "key", "time",
];
