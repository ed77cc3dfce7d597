//! Equity source precedence and percentage change

use crate::domain::entities::snapshot_row::EquitySource;
use crate::domain::entities::upstream_status::UpstreamStatus;

/// Display cap applied to the percentage change
pub const PCT_DISPLAY_CAP: f64 = 100.0;

/// Pick the equity figure to publish.
///
/// Positive upstream equity wins; otherwise a positive zero-balance
/// transaction amount; otherwise nothing.
pub fn resolve_equity(
    equity: Option<f64>,
    zero_balance_amount: Option<f64>,
) -> (Option<f64>, EquitySource) {
    match (equity, zero_balance_amount) {
        (Some(e), _) if e > 0.0 => (Some(e), EquitySource::Equity),
        (_, Some(z)) if z > 0.0 => (Some(z), EquitySource::ZeroBalanceTxn),
        _ => (None, EquitySource::Missing),
    }
}

/// Same as [`resolve_equity`] for an optional status
pub fn resolve_status_equity(status: Option<&UpstreamStatus>) -> (Option<f64>, EquitySource) {
    match status {
        Some(s) => resolve_equity(s.equity, s.zero_balance_amount),
        None => (None, EquitySource::Missing),
    }
}

/// Signed, unbounded change against the baseline
pub fn pct_change(equity: Option<f64>, baseline: f64) -> Option<f64> {
    let equity = equity?;
    if baseline > 0.0 {
        Some((equity - baseline) / baseline * 100.0)
    } else {
        None
    }
}

/// Display value, capped above and never raised
pub fn pct_display(pct_change: Option<f64>) -> Option<f64> {
    pct_change.map(|p| p.min(PCT_DISPLAY_CAP))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_table() {
        assert_eq!(resolve_equity(Some(5.0), None), (Some(5.0), EquitySource::Equity));
        assert_eq!(resolve_equity(Some(0.0), None), (None, EquitySource::Missing));
        assert_eq!(
            resolve_equity(None, Some(10.0)),
            (Some(10.0), EquitySource::ZeroBalanceTxn)
        );
        assert_eq!(resolve_equity(None, None), (None, EquitySource::Missing));
        assert_eq!(
            resolve_equity(Some(-3.0), Some(7.0)),
            (Some(7.0), EquitySource::ZeroBalanceTxn)
        );
    }

    #[test]
    fn test_equity_beats_zero_balance() {
        assert_eq!(
            resolve_equity(Some(42.0), Some(7.0)),
            (Some(42.0), EquitySource::Equity)
        );
        assert_eq!(resolve_equity(Some(0.0), Some(0.0)), (None, EquitySource::Missing));
    }

    #[test]
    fn test_missing_status_is_missing_source() {
        assert_eq!(resolve_status_equity(None), (None, EquitySource::Missing));
    }

    #[test]
    fn test_pct_change() {
        assert_eq!(pct_change(Some(55000.0), 50000.0), Some(10.0));
        assert_eq!(pct_change(Some(25000.0), 50000.0), Some(-50.0));
        assert_eq!(pct_change(None, 50000.0), None);
        assert_eq!(pct_change(Some(1.0), 0.0), None);
        assert_eq!(pct_change(Some(1.0), -5.0), None);
    }

    #[test]
    fn test_pct_display_caps_without_raising() {
        assert_eq!(pct_display(Some(250.0)), Some(100.0));
        assert_eq!(pct_display(Some(100.0)), Some(100.0));
        assert_eq!(pct_display(Some(-80.0)), Some(-80.0));
        assert_eq!(pct_display(None), None);

        for equity in [1.0, 49_999.0, 50_000.0, 99_999.0, 100_001.0, 1e9] {
            let change = pct_change(Some(equity), 50_000.0).unwrap();
            let display = pct_display(Some(change)).unwrap();
            assert!(display <= change);
            assert!(display <= PCT_DISPLAY_CAP);
        }
    }
}
