//! Caller identity and access levels.
//!
//! Every orchestrator operation takes an authenticated [`Identity`] plus
//! the [`AccessLevel`] it requires, independent of any request-handling
//! layer. Background tasks call back with a task-scoped identity resolved
//! from the bearer token carried in their task descriptor.

/// How a caller obtained its authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// An interactive caller (e.g. via the web layer).
    User,
    /// A background task holding a task-scoped bearer token.
    Task,
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user name the entity ownership checks run against.
    pub user: String,
    pub scope: Scope,
}

impl Identity {
    /// An interactive user identity.
    pub fn user(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            scope: Scope::User,
        }
    }

    /// A task-scoped identity acting on behalf of `user`.
    pub fn task(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            scope: Scope::Task,
        }
    }

    pub fn is_task(&self) -> bool {
        self.scope == Scope::Task
    }
}

/// Access level an operation requires on the entity it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}
