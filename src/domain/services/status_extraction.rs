//! Defensive extraction of [`UpstreamStatus`] from a raw status response.
//!
//! Nothing here fails: absent sections, nulls and wrongly typed values all
//! degrade to `None` (or `false`).

use serde_json::Value;

use super::timestamps::{
    earliest_timestamp, first_timestamp, latest_timestamp, ACCOUNT_CREATED_FIELDS,
    POSITION_CLOSE_FIELDS, TRANSACTION_TIME_FIELDS,
};
use crate::domain::entities::ledger_account::text_field;
use crate::domain::entities::upstream_status::UpstreamStatus;

const ZERO_BALANCE_MARKER: &str = "zero balance";
const INITIAL_BALANCE_MARKER: &str = "initial balance";
const PURCHASE_GROUP_MARKER: &str = "purchase";

/// Interpret a JSON number or numeric string as `f64`
pub fn lenient_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn section<'a>(parent: &'a Value, key: &str) -> Option<&'a Value> {
    parent.get(key).filter(|v| v.is_object())
}

fn list<'a>(parent: &'a Value, key: &str) -> &'a [Value] {
    parent
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn comment(txn: &Value) -> String {
    txn.get("Comment")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase()
}

/// Build the status snapshot from a decoded response body
pub fn extract_status(data: &Value) -> UpstreamStatus {
    let user_data = section(data, "UserData");
    let details = user_data.and_then(|u| section(u, "UserDetails"));
    let balance = user_data.and_then(|u| section(u, "AccountBalance"));
    let group = user_data.and_then(|u| section(u, "GroupInfo"));

    let transactions = list(data, "MonetaryTransactions");
    let closed_positions = match list(data, "ClosePositions") {
        [] => list(data, "ClosedPositions"),
        positions => positions,
    };

    let group_name = group.and_then(|g| text_field(g, "GroupName"));
    let is_purchase_group = group_name
        .as_deref()
        .map(|name| name.to_lowercase().contains(PURCHASE_GROUP_MARKER))
        .unwrap_or(false);

    let created_at = details
        .and_then(|d| first_timestamp(d, &ACCOUNT_CREATED_FIELDS))
        .or_else(|| earliest_timestamp(transactions, &TRANSACTION_TIME_FIELDS));

    let last_closed_at = latest_timestamp(closed_positions, &POSITION_CLOSE_FIELDS);

    let zero_balance_txn = transactions
        .iter()
        .find(|t| comment(t).contains(ZERO_BALANCE_MARKER));
    let zero_balance_amount = zero_balance_txn.and_then(|t| match t.get("Amount") {
        None | Some(Value::Null) => Some(0.0),
        Some(amount) => lenient_number(amount).map(f64::abs),
    });

    let plan = transactions
        .iter()
        .find(|t| comment(t).starts_with(INITIAL_BALANCE_MARKER))
        .and_then(|t| t.get("Amount"))
        .and_then(lenient_number);

    UpstreamStatus {
        country: details.and_then(|d| text_field(d, "Country")),
        plan,
        balance: balance.and_then(|b| b.get("Balance")).and_then(lenient_number),
        equity: balance.and_then(|b| b.get("Equity")).and_then(lenient_number),
        open_pnl: balance.and_then(|b| b.get("OpenPnL")).and_then(lenient_number),
        group_name,
        is_purchase_group,
        blown_up: zero_balance_txn.is_some(),
        zero_balance_amount,
        created_at,
        last_closed_at,
    }
}
