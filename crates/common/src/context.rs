//! Pairing scope.

/// Identifies the pairing a device operates in and who the local user is.
///
/// Constructed once at pairing and passed explicitly into every queue and
/// feed operation; torn down at unpairing by dropping the engine. There is
/// deliberately no ambient global fallback: nothing in this crate runs
/// without a bound context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoupleContext {
    couple_id: String,
    local_user_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("couple id must not be empty")]
    EmptyCoupleId,
    #[error("local user id must not be empty")]
    EmptyUserId,
}

impl CoupleContext {
    /// Bind a context. Input is trimmed; empty components are rejected.
    pub fn new(
        couple_id: impl AsRef<str>,
        local_user_id: impl AsRef<str>,
    ) -> Result<Self, ContextError> {
        let couple_id = couple_id.as_ref().trim();
        if couple_id.is_empty() {
            return Err(ContextError::EmptyCoupleId);
        }
        let local_user_id = local_user_id.as_ref().trim();
        if local_user_id.is_empty() {
            return Err(ContextError::EmptyUserId);
        }
        Ok(Self {
            couple_id: couple_id.to_string(),
            local_user_id: local_user_id.to_string(),
        })
    }

    pub fn couple_id(&self) -> &str {
        &self.couple_id
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_whitespace() {
        let ctx = CoupleContext::new("  c1  ", "u1\n").unwrap();
        assert_eq!(ctx.couple_id(), "c1");
        assert_eq!(ctx.local_user_id(), "u1");
    }

    #[test]
    fn rejects_empty_components() {
        assert!(matches!(
            CoupleContext::new("   ", "u1"),
            Err(ContextError::EmptyCoupleId)
        ));
        assert!(matches!(
            CoupleContext::new("c1", ""),
            Err(ContextError::EmptyUserId)
        ));
    }
}
