//! Tenant lifecycle states.

use std::fmt;
use std::str::FromStr;

use crate::error::TenantError;

/// Lifecycle state of a tenant.
///
/// ```text
/// Registering -> Ready -> Removing -> (erased)
///      \           |         /
///       +------> Error <----+
/// ```
///
/// `Registering` and `Removing` are transient: an entry found in either state
/// belongs to an operation that did not finish. `Error` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TenantState {
    Registering,
    Ready,
    Removing,
    Error,
}

impl TenantState {
    /// All states in wire order.
    pub const ALL: [TenantState; 4] = [
        TenantState::Registering,
        TenantState::Ready,
        TenantState::Removing,
        TenantState::Error,
    ];

    /// Wire byte.
    pub fn as_u8(self) -> u8 {
        match self {
            TenantState::Registering => 0,
            TenantState::Ready => 1,
            TenantState::Removing => 2,
            TenantState::Error => 3,
        }
    }

    /// Decode a wire byte. Anything outside `0..=3` is corruption.
    pub fn from_u8(value: u8) -> Result<Self, TenantError> {
        match value {
            0 => Ok(TenantState::Registering),
            1 => Ok(TenantState::Ready),
            2 => Ok(TenantState::Removing),
            3 => Ok(TenantState::Error),
            other => Err(TenantError::CorruptEntry {
                reason: format!("tenant state {other} out of range"),
            }),
        }
    }

    /// Canonical lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            TenantState::Registering => "registering",
            TenantState::Ready => "ready",
            TenantState::Removing => "removing",
            TenantState::Error => "error",
        }
    }

    /// True for states a finished operation never leaves behind.
    pub fn is_transient(self) -> bool {
        matches!(self, TenantState::Registering | TenantState::Removing)
    }
}

impl fmt::Display for TenantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantState {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TenantState::ALL.into_iter().find(|state| state.as_str() == s).ok_or_else(|| TenantError::InvalidTenantState {
            value: s.to_string(),
        })
    }
}

/// Canonical name of a state.
pub fn tenant_state_to_string(state: TenantState) -> String {
    state.to_string()
}

/// Parse a canonical state name.
pub fn string_to_tenant_state(value: &str) -> Result<TenantState, TenantError> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for state in TenantState::ALL {
            assert_eq!(string_to_tenant_state(&tenant_state_to_string(state)).unwrap(), state);
        }
    }

    #[test]
    fn test_unknown_name() {
        let err = "deleted".parse::<TenantState>().unwrap_err();
        assert!(matches!(err, TenantError::InvalidTenantState { value } if value == "deleted"));
    }

    #[test]
    fn test_wire_bytes() {
        for state in TenantState::ALL {
            assert_eq!(TenantState::from_u8(state.as_u8()).unwrap(), state);
        }
        assert!(matches!(TenantState::from_u8(4), Err(TenantError::CorruptEntry { .. })));
        assert!(matches!(TenantState::from_u8(99), Err(TenantError::CorruptEntry { .. })));
    }

    #[test]
    fn test_transient_states() {
        assert!(TenantState::Registering.is_transient());
        assert!(TenantState::Removing.is_transient());
        assert!(!TenantState::Ready.is_transient());
        assert!(!TenantState::Error.is_transient());
    }
}
