//! Pure decision functions for tenant lifecycle management.
//!
//! No I/O. The manager calls these and performs the storage effects.

use crate::codec::TenantId;
use crate::state::TenantState;

/// Whether a tenant may move from `from` to `to`.
///
/// Allowed: `Registering -> Ready`, `Registering | Ready -> Removing`, and any
/// non-error state to `Error`. Nothing leaves `Error`.
#[inline]
pub fn is_valid_transition(from: TenantState, to: TenantState) -> bool {
    use TenantState::*;
    matches!(
        (from, to),
        (Registering, Ready) | (Registering, Removing) | (Ready, Removing) | (Registering | Ready | Removing, Error)
    )
}

/// Next id after the counter value `last`. An absent counter reads as 0, so
/// the first tenant gets id 1.
#[inline]
pub fn next_tenant_id(last: Option<TenantId>) -> Option<TenantId> {
    let last = last.map_or(0, TenantId::get);
    last.checked_add(1).map(TenantId)
}

/// Result of backoff calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffResult {
    /// Sleep duration in milliseconds (includes jitter).
    pub sleep_ms: u64,
    /// Backoff for the next attempt.
    pub next_backoff_ms: u64,
}

/// Exponential backoff with additive jitter bounded by half the current backoff.
#[inline]
pub fn compute_backoff_with_jitter(current_backoff_ms: u64, max_backoff_ms: u64, jitter_seed: u64) -> BackoffResult {
    let max_jitter = current_backoff_ms.saturating_div(2).saturating_add(1);
    let jitter = jitter_seed % max_jitter;
    BackoffResult {
        sleep_ms: current_backoff_ms.saturating_add(jitter),
        next_backoff_ms: current_backoff_ms.saturating_mul(2).min(max_backoff_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(is_valid_transition(TenantState::Registering, TenantState::Ready));
        assert!(is_valid_transition(TenantState::Ready, TenantState::Removing));
        assert!(is_valid_transition(TenantState::Registering, TenantState::Removing));
    }

    #[test]
    fn test_error_is_absorbing() {
        for from in TenantState::ALL {
            if from != TenantState::Error {
                assert!(is_valid_transition(from, TenantState::Error));
            }
            assert!(!is_valid_transition(TenantState::Error, from));
        }
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!is_valid_transition(TenantState::Ready, TenantState::Registering));
        assert!(!is_valid_transition(TenantState::Removing, TenantState::Ready));
        assert!(!is_valid_transition(TenantState::Removing, TenantState::Registering));
    }

    #[test]
    fn test_next_tenant_id() {
        assert_eq!(next_tenant_id(None), Some(TenantId(1)));
        assert_eq!(next_tenant_id(Some(TenantId(41))), Some(TenantId(42)));
        assert_eq!(next_tenant_id(Some(TenantId(i64::MAX))), None);
    }

    #[test]
    fn test_backoff_with_jitter() {
        let result = compute_backoff_with_jitter(100, 1000, 25);
        assert_eq!(result.sleep_ms, 125);
        assert_eq!(result.next_backoff_ms, 200);
        let capped = compute_backoff_with_jitter(800, 1000, 0);
        assert_eq!(capped.next_backoff_ms, 1000);
    }
}
