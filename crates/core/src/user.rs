//! Identity of the user editing a form.
//!
//! Only a redacted snapshot is kept with the staged form: the username and the email address.

use flash_types::NonEmptyText;
use serde::{Deserialize, Serialize};

/// A user as supplied by the caller's account system.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub email: Option<String>,
}

impl User {
    pub fn new(username: impl Into<String>, email: Option<String>) -> Self {
        Self {
            username: username.into(),
            email,
        }
    }
}

/// The identity recorded on a staged form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashUser {
    pub username: NonEmptyText,
    /// Empty when the account has no address.
    #[serde(default)]
    pub email: String,
}

impl FlashUser {
    /// Snapshots `user`, or returns `None` when there is no user or the username is blank.
    pub fn snapshot(user: Option<&User>) -> Option<Self> {
        let user = user?;
        let username = NonEmptyText::new(&user.username).ok()?;
        Some(Self {
            username,
            email: user.email.clone().unwrap_or_default(),
        })
    }
}
