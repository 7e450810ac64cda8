//! Cache key definitions.
//!
//! A [`QueryKey`] identifies one cached remote read: the procedure path plus
//! the canonical JSON form of its input. Object keys are sorted during
//! canonicalization, so two inputs that differ only in field order share a key.

use std::fmt;

use chirp_api_types::Procedure;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity of a cached remote read. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "WireKey", from = "WireKey")]
pub struct QueryKey {
    path: Vec<String>,
    input: String,
}

impl QueryKey {
    /// Build a key from a path and an already-serialized input value.
    pub fn new<S: AsRef<str>>(path: &[S], input: &Value) -> Self {
        Self {
            path: path.iter().map(|seg| seg.as_ref().to_string()).collect(),
            input: canonical_json(input),
        }
    }

    /// Build the key for a typed procedure call.
    pub fn for_procedure<P: Procedure>(input: &P::Input) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(input)?;
        Ok(Self::new(P::PATH, &value))
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }

    /// Canonical JSON text of the input.
    pub fn input_json(&self) -> &str {
        &self.input
    }

    pub fn input(&self) -> Value {
        serde_json::from_str(&self.input).unwrap_or(Value::Null)
    }

    /// True when this key belongs to the procedure at `path`.
    pub fn is_procedure<S: AsRef<str>>(&self, path: &[S]) -> bool {
        self.path.len() == path.len()
            && self
                .path
                .iter()
                .zip(path.iter())
                .all(|(ours, theirs)| ours == theirs.as_ref())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.dotted_path(), self.input)
    }
}

#[derive(Serialize, Deserialize)]
struct WireKey {
    path: Vec<String>,
    input: Value,
}

impl From<QueryKey> for WireKey {
    fn from(key: QueryKey) -> Self {
        let input = key.input();
        Self {
            path: key.path,
            input,
        }
    }
}

impl From<WireKey> for QueryKey {
    fn from(wire: WireKey) -> Self {
        QueryKey::new(&wire.path, &wire.input)
    }
}

/// Selects the cache entries an invalidation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPredicate {
    /// Exactly one key.
    Exact(QueryKey),
    /// Every key of one procedure, whatever its input.
    Procedure(Vec<String>),
    /// Every key.
    All,
}

impl KeyPredicate {
    pub fn procedure<P: Procedure>() -> Self {
        Self::Procedure(P::PATH.iter().map(|seg| seg.to_string()).collect())
    }

    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyPredicate::Exact(expected) => expected == key,
            KeyPredicate::Procedure(path) => key.is_procedure(path),
            KeyPredicate::All => true,
        }
    }
}

/// Serialize a JSON value with object keys in sorted order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (idx, (name, field)) in fields.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
