use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::types::DataType;

/// A single scalar value as carried in bind variables and result rows.
///
/// Unlike SQL comparison semantics, `Null == Null` here: these values are
/// keys in bind-variable maps and lookup sets, not predicate operands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Text(String),
    /// Raw bytes (VARBINARY / keyspace ids).
    Bytes(Vec<u8>),
    /// Tuple value bound to a list bind variable (`IN ::vals`).
    List(Vec<Datum>),
}

impl Datum {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Datum::Null => None,
            Datum::Boolean(_) => Some(DataType::Boolean),
            Datum::Int64(_) => Some(DataType::Int64),
            Datum::UInt64(_) => Some(DataType::UInt64),
            Datum::Float64(_) => Some(DataType::Float64),
            Datum::Text(_) => Some(DataType::Text),
            Datum::Bytes(_) => Some(DataType::Bytes),
            Datum::List(_) => Some(DataType::Tuple),
        }
    }

    /// Short type label for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Datum::Null => "NULL",
            Datum::Boolean(_) => "BOOLEAN",
            Datum::Int64(_) => "INT64",
            Datum::UInt64(_) => "UINT64",
            Datum::Float64(_) => "FLOAT64",
            Datum::Text(_) => "TEXT",
            Datum::Bytes(_) => "BYTES",
            Datum::List(_) => "TUPLE",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int64(v) => Some(*v),
            Datum::UInt64(v) => i64::try_from(*v).ok(),
            Datum::Text(s) => s.parse().ok(),
            Datum::Bytes(b) => std::str::from_utf8(b).ok()?.parse().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Datum::Int64(v) => u64::try_from(*v).ok(),
            Datum::UInt64(v) => Some(*v),
            Datum::Text(s) => s.parse().ok(),
            Datum::Bytes(b) => std::str::from_utf8(b).ok()?.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Byte view of string-like values.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Datum::Text(s) => Some(s.as_bytes()),
            Datum::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Datum]> {
        match self {
            Datum::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Encode as a SQL literal for inlining into rewritten queries.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Datum::Null => "null".to_string(),
            Datum::Boolean(b) => if *b { "1".into() } else { "0".into() },
            Datum::Int64(v) => v.to_string(),
            Datum::UInt64(v) => v.to_string(),
            Datum::Float64(v) => v.to_string(),
            Datum::Text(s) => quote_sql_string(s),
            Datum::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => quote_sql_string(s),
                Err(_) => {
                    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                    format!("X'{}'", hex)
                }
            },
            Datum::List(items) => {
                let inner: Vec<String> = items.iter().map(|d| d.to_sql_literal()).collect();
                format!("({})", inner.join(", "))
            }
        }
    }
}

fn quote_sql_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Int64(v) => write!(f, "{}", v),
            Datum::UInt64(v) => write!(f, "{}", v),
            Datum::Float64(v) => write!(f, "{}", v),
            Datum::Text(s) => write!(f, "{}", s),
            Datum::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => write!(f, "{}", s),
                Err(_) => {
                    write!(f, "\\x")?;
                    for b in bytes {
                        write!(f, "{:02x}", b)?;
                    }
                    Ok(())
                }
            },
            Datum::List(items) => {
                write!(f, "(")?;
                for (i, d) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", d)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Datum::Null, Datum::Null) => true,
            (Datum::Boolean(a), Datum::Boolean(b)) => a == b,
            (Datum::Int64(a), Datum::Int64(b)) => a == b,
            (Datum::UInt64(a), Datum::UInt64(b)) => a == b,
            (Datum::Int64(a), Datum::UInt64(b)) | (Datum::UInt64(b), Datum::Int64(a)) => {
                u64::try_from(*a).map(|a| a == *b).unwrap_or(false)
            }
            (Datum::Float64(a), Datum::Float64(b)) => a.to_bits() == b.to_bits(),
            // Text and bytes compare by content: MySQL hands back VARCHAR
            // columns as raw bytes.
            (Datum::Text(a), Datum::Text(b)) => a == b,
            (Datum::Bytes(a), Datum::Bytes(b)) => a == b,
            (Datum::Text(a), Datum::Bytes(b)) | (Datum::Bytes(b), Datum::Text(a)) => {
                a.as_bytes() == b.as_slice()
            }
            (Datum::List(a), Datum::List(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Datum {}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Explicit type tags so values equal across variants hash the same:
        // non-negative Int64(x) == UInt64(x), Text(s) == Bytes(s).
        match self {
            Datum::Null => 0u8.hash(state),
            Datum::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Datum::Int64(v) => match u64::try_from(*v) {
                Ok(u) => {
                    2u8.hash(state);
                    u.hash(state);
                }
                Err(_) => {
                    3u8.hash(state);
                    v.hash(state);
                }
            },
            Datum::UInt64(v) => {
                2u8.hash(state);
                v.hash(state);
            }
            Datum::Float64(v) => {
                4u8.hash(state);
                v.to_bits().hash(state);
            }
            Datum::Text(s) => {
                5u8.hash(state);
                s.as_bytes().hash(state);
            }
            Datum::Bytes(b) => {
                5u8.hash(state);
                b.as_slice().hash(state);
            }
            Datum::List(items) => {
                6u8.hash(state);
                items.len().hash(state);
                for d in items {
                    d.hash(state);
                }
            }
        }
    }
}

impl PartialOrd for Datum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Datum {
    /// Total order used for deterministic output (sorted lookup deletes,
    /// stable test assertions). Nulls sort first; unrelated types compare
    /// by type tag.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Datum::Int64(a), Datum::Int64(b)) => a.cmp(b),
            (Datum::UInt64(a), Datum::UInt64(b)) => a.cmp(b),
            (Datum::Int64(a), Datum::UInt64(b)) => (*a as i128).cmp(&(*b as i128)),
            (Datum::UInt64(a), Datum::Int64(b)) => (*a as i128).cmp(&(*b as i128)),
            (Datum::Float64(a), Datum::Float64(b)) => a.total_cmp(b),
            (Datum::Boolean(a), Datum::Boolean(b)) => a.cmp(b),
            (a, b) if a.as_bytes().is_some() && b.as_bytes().is_some() => {
                a.as_bytes().cmp(&b.as_bytes())
            }
            (Datum::List(a), Datum::List(b)) => a.cmp(b),
            (a, b) => a.order_tag().cmp(&b.order_tag()),
        }
    }
}

impl Datum {
    fn order_tag(&self) -> u8 {
        match self {
            Datum::Null => 0,
            Datum::Boolean(_) => 1,
            Datum::Int64(_) | Datum::UInt64(_) => 2,
            Datum::Float64(_) => 3,
            Datum::Text(_) | Datum::Bytes(_) => 4,
            Datum::List(_) => 5,
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int64(v)
    }
}

impl From<u64> for Datum {
    fn from(v: u64) -> Self {
        Datum::UInt64(v)
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Datum::Boolean(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Text(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Datum::Text(v)
    }
}

impl From<Vec<u8>> for Datum {
    fn from(v: Vec<u8>) -> Self {
        Datum::Bytes(v)
    }
}

impl From<Vec<Datum>> for Datum {
    fn from(v: Vec<Datum>) -> Self {
        Datum::List(v)
    }
}

/// A row of datums (result rows, pre-image rows).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnedRow {
    pub values: Vec<Datum>,
}

impl OwnedRow {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    pub fn get(&self, idx: usize) -> Option<&Datum> {
        self.values.get(idx)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for OwnedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}
