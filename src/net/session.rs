use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of the local session (the logged-in username).
///
/// Threaded explicitly into everything that must recognise the local user's
/// own echoed traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionIdentity(String);

impl SessionIdentity {
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    /// Anonymous identity for sessions without a configured username
    pub fn guest() -> Self {
        Self(format!("guest-{}", Uuid::new_v4().simple()))
    }

    pub fn username(&self) -> &str {
        &self.0
    }

    /// Does `username` refer to this session?
    #[inline]
    pub fn is_self(&self, username: &str) -> bool {
        self.0 == username
    }
}

impl std::fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
