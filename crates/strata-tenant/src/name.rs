//! Tenant and tenant group names.

use strata_constants::tenant::MAX_TENANT_NAME_SIZE;

use crate::error::TenantError;

/// Name of a tenant. Arbitrary bytes, never empty, never starting with `0xFF`.
pub type TenantName = Vec<u8>;

/// Name of a tenant group. Same rules as [`TenantName`].
pub type TenantGroupName = Vec<u8>;

/// Human-readable rendering of a byte name for logs and errors.
pub fn printable(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

/// Check a tenant or group name.
pub fn validate_name(name: &[u8]) -> Result<(), TenantError> {
    let reason = if name.is_empty() {
        "name is empty".to_string()
    } else if name.len() > MAX_TENANT_NAME_SIZE as usize {
        format!("name is {} bytes, maximum is {MAX_TENANT_NAME_SIZE}", name.len())
    } else if name[0] == 0xFF {
        "names starting with \\xff are reserved".to_string()
    } else {
        return Ok(());
    };
    Err(TenantError::InvalidTenantName {
        name: printable(name),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_name(b"alpha").is_ok());
        assert!(validate_name(b"\x00binary\xfe").is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(matches!(validate_name(b""), Err(TenantError::InvalidTenantName { .. })));
        assert!(matches!(validate_name(b"\xffsystem"), Err(TenantError::InvalidTenantName { .. })));
        let long = vec![b'a'; MAX_TENANT_NAME_SIZE as usize + 1];
        assert!(matches!(validate_name(&long), Err(TenantError::InvalidTenantName { .. })));
    }

    #[test]
    fn test_printable() {
        assert_eq!(printable(b"alpha"), "alpha");
        assert_eq!(printable(b"\xff/x"), "\\xff/x");
    }
}
