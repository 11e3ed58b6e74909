/// Helpers for reading command and reply documents in canonical Extended JSON
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// A command, reply or option set
pub type Document = Map<String, Value>;

/// Name of a command: the first key of its document
pub fn command_name(command: &Document) -> &str {
    command.keys().next().map(String::as_str).unwrap_or("<empty>")
}

/// Read a 64-bit integer by value.
///
/// Accepts plain JSON integers, floats with an integral value, and the
/// `$numberLong` / `$numberInt` / `$numberDouble` wrappers.
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(v) => Some(v),
            None => integral(n.as_f64()?),
        },
        Value::Object(obj) if obj.len() == 1 => {
            if let Some(wrapped) = obj.get("$numberLong").or_else(|| obj.get("$numberInt")) {
                return wrapped.as_str()?.trim().parse().ok();
            }
            integral(wrapped_double(obj)?)
        }
        _ => None,
    }
}

/// Read any numeric value as a double, including the `$numberDouble`
/// spellings `Infinity`, `-Infinity` and `NaN`.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(obj) if obj.len() == 1 => match wrapped_double(obj) {
            Some(v) => Some(v),
            None => as_i64(value).map(|v| v as f64),
        },
        _ => None,
    }
}

fn wrapped_double(obj: &Map<String, Value>) -> Option<f64> {
    let text = obj
        .get("$numberDouble")
        .or_else(|| obj.get("$numberDecimal"))?
        .as_str()?
        .trim();
    match text {
        "Infinity" | "+Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Truthiness of a reply's `ok` field
pub fn is_ok(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(Value::Bool(b)) => *b,
        Some(value) => as_f64(value).is_some_and(|v| v != 0.0),
        None => false,
    }
}

/// Truthiness for flag-like fields such as `localOps`.
///
/// Numbers are true when non-zero whatever their wrapper; null and
/// `$undefined` are false; any other value is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Object(obj) if obj.contains_key("$undefined") => false,
        other => as_f64(other).map(|v| v != 0.0).unwrap_or(true),
    }
}

/// Server-issued cursor handle. Zero means the result set was returned whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorId(pub i64);

impl CursorId {
    pub const NONE: CursorId = CursorId(0);

    pub fn from_value(value: &Value) -> Option<Self> {
        as_i64(value).map(CursorId)
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// `cursor.id` of a reply, if present
    pub fn from_reply(reply: &Document) -> Option<Self> {
        reply
            .get("cursor")
            .and_then(Value::as_object)
            .and_then(|cursor| cursor.get("id"))
            .and_then(Self::from_value)
    }
}

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical cluster timestamp, ordered by seconds then increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClusterTime {
    pub t: u32,
    pub i: u32,
}

impl ClusterTime {
    pub fn new(t: u32, i: u32) -> Self {
        Self { t, i }
    }

    /// Parse `{"$timestamp": {"t": .., "i": ..}}` or a packed `t << 32 | i` integer
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(obj) => {
                let ts = obj.get("$timestamp")?.as_object()?;
                let t = u32::try_from(ts.get("t")?.as_u64()?).ok()?;
                let i = u32::try_from(ts.get("i")?.as_u64()?).ok()?;
                Some(Self { t, i })
            }
            Value::Number(n) => {
                let packed = n.as_u64()?;
                Some(Self {
                    t: (packed >> 32) as u32,
                    i: packed as u32,
                })
            }
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({ "$timestamp": { "t": self.t, "i": self.i } })
    }
}

impl Ord for ClusterTime {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.t, self.i).cmp(&(other.t, other.i))
    }
}

impl PartialOrd for ClusterTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ClusterTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}, {})", self.t, self.i)
    }
}

/// Read `$clusterTime.clusterTime` from a command or reply
pub fn cluster_time_of(doc: &Document) -> Option<ClusterTime> {
    doc.get("$clusterTime")
        .and_then(Value::as_object)
        .and_then(|gossip| gossip.get("clusterTime"))
        .and_then(ClusterTime::from_value)
}

/// Copy of `value` with object keys sorted at every level
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(obj.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&obj[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
