use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Canonical account identifier shared by the ledger, the status API and
/// the snapshot table.
///
/// Numeric forms (`121477`, `121477.0`, `" 121477 "`) collapse to the plain
/// integer string; anything that does not parse as a number is kept as the
/// trimmed original.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Normalize a raw ledger value. Returns `None` for null, empty or NaN
    /// identifiers.
    pub fn normalize(raw: &Value) -> Option<Self> {
        match raw {
            Value::Null => None,
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self(i.to_string()))
                } else if let Some(u) = n.as_u64() {
                    Some(Self(u.to_string()))
                } else {
                    n.as_f64().and_then(Self::from_float)
                }
            }
            Value::String(s) => Self::parse(s),
            Value::Bool(b) => Some(Self(b.to_string())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Normalize a textual identifier
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => Self::from_float(f),
            _ => Some(Self(trimmed.to_string())),
        }
    }

    fn from_float(f: f64) -> Option<Self> {
        if !f.is_finite() {
            return None;
        }
        // Adding 0.0 turns -0.0 into 0.0
        Some(Self(format!("{:.0}", f.trunc() + 0.0)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One customer account as read from the ledger table.
///
/// The raw identifier is kept as returned by the backend; columns absent
/// from the response are simply empty.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerAccount {
    pub raw_id: Value,
    pub customer_name: Option<String>,
    pub temp_name: Option<String>,
}

/// Column names of the ledger table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerColumns {
    pub account_id: String,
    pub customer_name: String,
    pub temp_name: String,
}

impl Default for LedgerColumns {
    fn default() -> Self {
        Self {
            account_id: "lv_name".to_string(),
            customer_name: "lv_accountidname".to_string(),
            temp_name: "lv_tempname".to_string(),
        }
    }
}

impl LedgerColumns {
    /// Comma separated list for a PostgREST `select`
    pub fn select_list(&self) -> String {
        format!("{},{},{}", self.account_id, self.customer_name, self.temp_name)
    }
}

impl LedgerAccount {
    /// Build an account from one backend row, defaulting missing columns
    pub fn from_row(row: &Value, columns: &LedgerColumns) -> Self {
        Self {
            raw_id: row.get(&columns.account_id).cloned().unwrap_or(Value::Null),
            customer_name: text_field(row, &columns.customer_name),
            temp_name: text_field(row, &columns.temp_name),
        }
    }

    pub fn account_id(&self) -> Option<AccountId> {
        AccountId::normalize(&self.raw_id)
    }
}

/// Read a column as text, accepting numbers as well as strings
pub(crate) fn text_field(row: &Value, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
