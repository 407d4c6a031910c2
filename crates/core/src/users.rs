//! Authenticated user resolution.

use crate::errors::{Error, Result};

/// Provides the currently authenticated user id.
///
/// Every mutation is scoped by owner; implementations return
/// [`Error::Unauthenticated`] when no user is signed in, and callers
/// propagate that without retrying.
pub trait UserContext: Send + Sync {
    fn current_user_id(&self) -> Result<String>;
}

/// Fixed-user context for embedded/single-profile deployments and tests.
pub struct StaticUserContext {
    user_id: Option<String>,
}

impl StaticUserContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    /// A context with no signed-in user.
    pub fn signed_out() -> Self {
        Self { user_id: None }
    }
}

impl UserContext for StaticUserContext {
    fn current_user_id(&self) -> Result<String> {
        self.user_id.clone().ok_or(Error::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_out_context_is_an_error() {
        let ctx = StaticUserContext::signed_out();
        assert!(matches!(ctx.current_user_id(), Err(Error::Unauthenticated)));
    }

    #[test]
    fn static_context_returns_user() {
        let ctx = StaticUserContext::new("user-1");
        assert_eq!(ctx.current_user_id().unwrap(), "user-1");
    }
}
