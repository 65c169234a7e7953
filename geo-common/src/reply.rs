//! # Reply Model and Decoder
//!
//! Purpose: Normalize every JSON message the server sends (command replies,
//! scan/search pages, id lists, live geofence events, error replies) into one
//! flat `Reply`.
//!
//! ## Design Principles
//! 1. **Name Dispatch**: Top-level keys are matched by name; their order in the
//!    document only matters for `fields` index assignment.
//! 2. **Strict Vocabulary**: A key outside the reply vocabulary fails the whole
//!    decode with `UnknownField`.
//! 3. **Raw Passthrough**: Embedded objects are kept as JSON text; the client
//!    does not interpret geometry.
//! 4. **Pure**: Decoding touches no shared state and is safe from any thread.
//!
//! ## Field Name Indexing
//!
//! ```text
//! "fields": ["speed","heading"]        -> names {speed:0, heading:1}, values []
//! "fields": {"speed":12.5,"heading":90} -> names {speed:0, heading:1}, values [12.5, 90]
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::{Map, Value};

use crate::error::{DecodeError, DecodeResult};

/// One decoded server message.
///
/// Every field keeps its zero value unless the message carried the matching
/// key. `object` and `objects` are not checked for exclusivity; the reply
/// reflects whichever keys were present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    /// Server-reported success. Push events leave this `false`.
    pub ok: bool,
    pub id: String,
    /// Raw JSON text of the entity, or the plain string content when the
    /// server sent a quoted string.
    pub object: String,
    pub ids: Vec<String>,
    /// Raw JSON text of each entity, in array order.
    pub objects: Vec<String>,
    /// Field name to zero-based index, dense in first-seen order.
    pub field_names: HashMap<String, usize>,
    /// Values aligned with `field_names` indices. Empty when the server sent
    /// a bare name list.
    pub field_values: Vec<f64>,
    pub count: i64,
    pub cursor: i64,
    /// Time-to-live in seconds.
    pub ttl: f64,
    pub err: String,
    /// Opaque elapsed-time text, e.g. `"100ms"`.
    pub elapsed: String,

    /// Marks a message belonging to a live event feed.
    pub live: bool,
    pub command: String,
    pub group: String,
    pub detect: String,
    pub key: String,
    /// Event timestamp. `None` when absent or not RFC 3339.
    pub time: Option<DateTime<Utc>>,
}

impl Reply {
    /// Decodes one message into a fresh `Reply`.
    ///
    /// # Errors
    /// - `InvalidInput` when the bytes are not a JSON object.
    /// - `UnknownField` on the first key outside the reply vocabulary.
    /// - `UnknownFieldType` when `fields` is neither an array nor an object.
    ///
    /// # Examples
    /// ```rust
    /// use geo_common::Reply;
    ///
    /// let reply = Reply::decode(br#"{"ok":true,"ids":["a","b"],"count":2,"cursor":0}"#).unwrap();
    /// assert_eq!(reply.ids, vec!["a", "b"]);
    /// assert_eq!(reply.count, 2);
    /// ```
    pub fn decode(bytes: &[u8]) -> DecodeResult<Self> {
        let mut reply = Reply::default();
        reply.merge(bytes)?;
        Ok(reply)
    }

    /// Decodes a message held as text.
    pub fn decode_str(text: &str) -> DecodeResult<Self> {
        Self::decode(text.as_bytes())
    }

    /// Applies one message onto this instance.
    ///
    /// Keys are applied in document order. On error, keys applied before the
    /// failing one stay set; callers should treat the instance as invalid.
    pub fn merge(&mut self, bytes: &[u8]) -> DecodeResult<()> {
        let Members(members) = serde_json::from_slice::<Members>(bytes)
            .map_err(|err| DecodeError::InvalidInput(err.to_string()))?;

        for (key, value) in members {
            self.apply(&key, value)?;
        }
        Ok(())
    }

    fn apply(&mut self, key: &str, value: Value) -> DecodeResult<()> {
        match key {
            "ok" => self.ok = truthy(&value),
            "id" => self.id = text(value),
            "object" => self.object = raw_text(value),
            "ids" => self.ids.extend(elements(value).map(text)),
            "objects" => self
                .objects
                .extend(elements(value).map(|item| item.to_string())),
            "fields" => match value {
                Value::Array(names) => self.index_names(names),
                Value::Object(pairs) => self.index_pairs(pairs),
                _ => return Err(DecodeError::UnknownFieldType),
            },
            // Truncation toward zero; out-of-range values saturate.
            "count" => self.count = number(&value) as i64,
            "cursor" => self.cursor = number(&value) as i64,
            "ttl" => self.ttl = number(&value),
            "err" => self.err = text(value),
            "elapsed" => self.elapsed = text(value),
            "live" => self.live = truthy(&value),
            "command" => self.command = text(value),
            "group" => self.group = text(value),
            "detect" => self.detect = text(value),
            "key" => self.key = text(value),
            // Unparseable timestamps are left unset rather than rejected.
            "time" => self.time = value.as_str().and_then(parse_time),
            other => return Err(DecodeError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    fn index_names(&mut self, names: Vec<Value>) {
        for name in names {
            self.assign_index(text(name));
        }
    }

    fn index_pairs(&mut self, pairs: Map<String, Value>) {
        for (name, value) in pairs {
            let idx = self.assign_index(name);
            // An earlier name list may have assigned indices without values.
            if self.field_values.len() <= idx {
                self.field_values.resize(idx + 1, 0.0);
            }
            self.field_values[idx] = number(&value);
        }
    }

    /// Returns the index for `name`, assigning the next one on first sight.
    fn assign_index(&mut self, name: String) -> usize {
        let next = self.field_names.len();
        *self.field_names.entry(name).or_insert(next)
    }

    /// Looks up a field value by name.
    pub fn field(&self, name: &str) -> Option<f64> {
        self.field_names
            .get(name)
            .and_then(|&idx| self.field_values.get(idx).copied())
    }

    /// Field names ordered by their assigned index.
    pub fn field_names_ordered(&self) -> Vec<&str> {
        let mut names: Vec<(&str, usize)> = self
            .field_names
            .iter()
            .map(|(name, &idx)| (name.as_str(), idx))
            .collect();
        names.sort_unstable_by_key(|&(_, idx)| idx);
        names.into_iter().map(|(name, _)| name).collect()
    }
}

impl FromStr for Reply {
    type Err = DecodeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Reply::decode_str(text)
    }
}

/// Top-level members in document order. Repeated keys are all kept.
struct Members(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for Members {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(MembersVisitor)
    }
}

struct MembersVisitor;

impl<'de> Visitor<'de> for MembersVisitor {
    type Value = Members;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Members, A::Error> {
        let mut members = Vec::new();
        while let Some(member) = map.next_entry::<String, Value>()? {
            members.push(member);
        }
        Ok(Members(members))
    }
}

/// String content for strings, empty for null, raw JSON text otherwise.
fn text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// String content for strings, raw JSON text for everything else.
fn raw_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn number(value: &Value) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(s.as_str(), "1" | "t" | "T" | "true" | "TRUE" | "True"),
        _ => false,
    }
}

/// Array items in order; a scalar counts as one item and null as none.
fn elements(value: Value) -> impl Iterator<Item = Value> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    items.into_iter()
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::REPLY_KEYS;
    use chrono::{Datelike, Timelike};

    #[test]
    fn rejects_invalid_json() {
        let err = Reply::decode(b"{invalid}").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidInput(_)));
    }

    #[test]
    fn rejects_non_object_document() {
        let err = Reply::decode(b"[1,2]").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidInput(_)));
    }

    #[test]
    fn rejects_unknown_key() {
        let err = Reply::decode(br#"{"zzz":true}"#).unwrap_err();
        assert_eq!(err, DecodeError::UnknownField("zzz".to_string()));
    }

    #[test]
    fn rejects_scalar_fields() {
        let err = Reply::decode(br#"{"fields":true}"#).unwrap_err();
        assert_eq!(err, DecodeError::UnknownFieldType);
    }

    #[test]
    fn keeps_keys_applied_before_failure() {
        let mut reply = Reply::default();
        let err = reply
            .merge(br#"{"ok":true,"id":"truck1","bogus":1,"count":7}"#)
            .unwrap_err();
        assert_eq!(err, DecodeError::UnknownField("bogus".to_string()));
        assert!(reply.ok);
        assert_eq!(reply.id, "truck1");
        assert_eq!(reply.count, 0);
    }

    #[test]
    fn accepts_every_vocabulary_key() {
        for key in REPLY_KEYS {
            let value = if key == "fields" { "[]" } else { "null" };
            let doc = format!(r#"{{"{key}":{value}}}"#);
            assert!(Reply::decode_str(&doc).is_ok(), "key {key} rejected");
        }
    }

    #[test]
    fn decodes_single_object_reply() {
        let reply = Reply::decode(
            br#"{"ok":true,"object":{"type":"Point","coordinates":[0,0]},"fields":{"fY":999.999,"fZ":123},"ttl":500,"elapsed":"100ms"}"#,
        )
        .unwrap();

        assert!(reply.ok);
        assert_eq!(reply.object, r#"{"type":"Point","coordinates":[0,0]}"#);
        assert_eq!(reply.field_names.get("fY"), Some(&0));
        assert_eq!(reply.field_names.get("fZ"), Some(&1));
        assert_eq!(reply.field_values, vec![999.999, 123.0]);
        assert_eq!(reply.field("fZ"), Some(123.0));
        assert_eq!(reply.ttl, 500.0);
        assert_eq!(reply.elapsed, "100ms");
    }

    #[test]
    fn string_object_is_unquoted() {
        let reply = Reply::decode(br#"{"ok":true,"object":"hello world"}"#).unwrap();
        assert_eq!(reply.object, "hello world");
    }

    #[test]
    fn scalar_object_keeps_raw_text() {
        let reply = Reply::decode(br#"{"object":12.5}"#).unwrap();
        assert_eq!(reply.object, "12.5");
        let reply = Reply::decode(br#"{"object":[1,2]}"#).unwrap();
        assert_eq!(reply.object, "[1,2]");
        let reply = Reply::decode(br#"{"object":true}"#).unwrap();
        assert_eq!(reply.object, "true");
        let reply = Reply::decode(br#"{"object":null}"#).unwrap();
        assert_eq!(reply.object, "null");
    }

    #[test]
    fn decodes_scan_page_with_name_list() {
        let reply = Reply::decode(
            r#"{"ok":true,"fields":["fZ","fY"],"objects":[{"id":"value1","object":{"type":"Point","coordinates":[0,0]},"fields":[123,999]},{"id":"value2","object":{"type":"Point","coordinates":[45,45]},"fields":[0,456]}],"count":2,"cursor":1,"elapsed":"567.89µs"}"#
                .as_bytes(),
        )
        .unwrap();

        assert_eq!(reply.field_names_ordered(), vec!["fZ", "fY"]);
        assert!(reply.field_values.is_empty());
        assert_eq!(
            reply.objects,
            vec![
                r#"{"id":"value1","object":{"type":"Point","coordinates":[0,0]},"fields":[123,999]}"#,
                r#"{"id":"value2","object":{"type":"Point","coordinates":[45,45]},"fields":[0,456]}"#,
            ]
        );
        assert_eq!(reply.count, 2);
        assert_eq!(reply.cursor, 1);
        assert_eq!(reply.elapsed, "567.89µs");
    }

    #[test]
    fn decodes_id_list() {
        let reply =
            Reply::decode(br#"{"ok":true,"ids":["value1","value2"],"count":2,"cursor":0}"#)
                .unwrap();
        assert_eq!(reply.ids, vec!["value1", "value2"]);
        assert_eq!(reply.count, 2);
        assert_eq!(reply.cursor, 0);
    }

    #[test]
    fn repeated_field_name_keeps_first_index() {
        let reply = Reply::decode(br#"{"fields":["a","b","a","c"]}"#).unwrap();
        assert_eq!(reply.field_names.len(), 3);
        assert_eq!(reply.field_names_ordered(), vec!["a", "b", "c"]);
    }

    #[test]
    fn repeated_top_level_keys_are_all_applied() {
        let reply =
            Reply::decode(br#"{"ids":["a"],"ids":["b"],"fields":["x"],"fields":["y"]}"#).unwrap();
        assert_eq!(reply.ids, vec!["a", "b"]);
        assert_eq!(reply.field_names.get("x"), Some(&0));
        assert_eq!(reply.field_names.get("y"), Some(&1));
    }

    #[test]
    fn later_field_values_align_with_earlier_names() {
        let mut reply = Reply::default();
        reply.merge(br#"{"fields":["a"]}"#).unwrap();
        reply.merge(br#"{"fields":{"b":1}}"#).unwrap();
        assert_eq!(reply.field_names_ordered(), vec!["a", "b"]);
        assert_eq!(reply.field_values, vec![0.0, 1.0]);
        assert_eq!(reply.field("a"), Some(0.0));
        assert_eq!(reply.field("b"), Some(1.0));
    }

    #[test]
    fn counts_truncate_toward_zero() {
        let reply = Reply::decode(br#"{"count":3.9,"cursor":-2.5,"ttl":1.25}"#).unwrap();
        assert_eq!(reply.count, 3);
        assert_eq!(reply.cursor, -2);
        assert_eq!(reply.ttl, 1.25);
    }

    #[test]
    fn decodes_error_reply() {
        let reply =
            Reply::decode(r#"{"ok":false,"err":"id not found","elapsed":"9µs"}"#.as_bytes())
                .unwrap();
        assert!(!reply.ok);
        assert_eq!(reply.err, "id not found");
    }

    #[test]
    fn decodes_fence_events() {
        let start = Reply::decode(br#"{"ok":true,"live":true}"#).unwrap();
        assert!(start.ok && start.live);

        let enter = Reply::decode(
            br#"{"command":"set","group":"5b844beb0a1c1f009ac75639","detect":"enter","key":"test","time":"2018-08-27T19:07:23.578553343Z","id":"value3","object":{"type":"Point","coordinates":[30,30,800]},"fields":{}}"#,
        )
        .unwrap();
        assert!(!enter.ok);
        assert_eq!(enter.command, "set");
        assert_eq!(enter.group, "5b844beb0a1c1f009ac75639");
        assert_eq!(enter.detect, "enter");
        assert_eq!(enter.key, "test");
        assert_eq!(enter.id, "value3");
        assert_eq!(enter.object, r#"{"type":"Point","coordinates":[30,30,800]}"#);
        assert!(enter.field_names.is_empty());

        let time = enter.time.expect("timestamp");
        assert_eq!(time.year(), 2018);
        assert_eq!(time.second(), 23);
        assert_eq!(time.nanosecond(), 578_553_343);

        let del = Reply::decode(
            br#"{"command":"del","id":"value3","time":"2018-08-27T19:07:33.671191005Z"}"#,
        )
        .unwrap();
        assert_eq!(del.command, "del");
        assert!(del.time.is_some());
    }

    #[test]
    fn bad_timestamp_is_ignored() {
        let reply = Reply::decode(br#"{"command":"set","time":"yesterday"}"#).unwrap();
        assert_eq!(reply.command, "set");
        assert!(reply.time.is_none());
    }

    #[test]
    fn parses_through_from_str() {
        let reply: Reply = r#"{"ok":true,"id":"truck2"}"#.parse().unwrap();
        assert_eq!(reply.id, "truck2");
    }
}
