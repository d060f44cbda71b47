//! Size checks applied to every commit before it touches storage.

use strata_constants::MAX_KEY_SIZE;
use strata_constants::MAX_MUTATIONS_PER_COMMIT;
use strata_constants::MAX_VALUE_SIZE;
use strata_constants::RESERVED_KEY_PREFIX;
use strata_constants::api::MAX_READ_CONFLICT_RANGES;

use crate::error::StoreError;
use crate::store::CommitRequest;
use crate::types::Mutation;

/// Check a key against [`MAX_KEY_SIZE`] and the reserved prefix.
pub fn validate_key(key: &[u8]) -> Result<(), StoreError> {
    if key.len() > MAX_KEY_SIZE as usize {
        return Err(StoreError::KeyTooLarge {
            size: key.len() as u32,
            max: MAX_KEY_SIZE,
        });
    }
    if key.starts_with(RESERVED_KEY_PREFIX) {
        return Err(StoreError::ReservedKey);
    }
    Ok(())
}

/// Check a value against [`MAX_VALUE_SIZE`].
pub fn validate_value(value: &[u8]) -> Result<(), StoreError> {
    if value.len() > MAX_VALUE_SIZE as usize {
        return Err(StoreError::ValueTooLarge {
            size: value.len() as u32,
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

/// Validate a commit: mutation count, key and value sizes, range shapes.
pub fn validate_commit(request: &CommitRequest) -> Result<(), StoreError> {
    if request.mutations.len() > MAX_MUTATIONS_PER_COMMIT as usize {
        return Err(StoreError::TooManyMutations {
            count: request.mutations.len() as u32,
            max: MAX_MUTATIONS_PER_COMMIT,
        });
    }
    if request.read_conflicts.len() > MAX_READ_CONFLICT_RANGES as usize {
        return Err(StoreError::TooManyConflictRanges {
            count: request.read_conflicts.len() as u32,
            max: MAX_READ_CONFLICT_RANGES,
        });
    }
    for range in &request.read_conflicts {
        if range.end < range.begin {
            return Err(StoreError::InvalidRange);
        }
    }
    for mutation in &request.mutations {
        match mutation {
            Mutation::Set { key, value } => {
                validate_key(key)?;
                validate_value(value)?;
            }
            Mutation::Clear { key } => validate_key(key)?,
        }
    }
    Ok(())
}
