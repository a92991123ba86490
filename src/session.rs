//! Local mock sign-in
//!
//! There is no account backend. A [`Session`] is created from credentials,
//! saved as JSON in the key-value store, and handed explicitly to whatever
//! needs the current user's label.

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{KeyValueStore, StorageError};

pub const SESSION_KEY: &str = "leetcode_user";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("saved session is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(rename = "avatar")]
    pub avatar_url: String,
}

impl User {
    fn new(username: &str, email: &str, avatar_name: &str) -> Self {
        User {
            id: "1".to_string(),
            username: username.to_string(),
            email: email.to_string(),
            avatar_url: avatar_url(avatar_name),
        }
    }
}

pub fn avatar_url(name: &str) -> String {
    format!("https://ui-avatars.com/api/?name={}&background=random", name)
}

#[derive(Debug, Clone)]
pub enum Credentials {
    Password { email: String, password: String },
    Signup { username: String, email: String, password: String },
    Social { provider: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: User,
}

impl Session {
    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn display_name(&self) -> &str {
        &self.user.username
    }

    pub fn avatar_url(&self) -> &str {
        &self.user.avatar_url
    }
}

fn require<'a>(value: &'a str, field: &'static str) -> Result<&'a str, SessionError> {
    if value.is_empty() {
        Err(SessionError::MissingField(field))
    } else {
        Ok(value)
    }
}

fn user_for(credentials: &Credentials) -> Result<User, SessionError> {
    match credentials {
        Credentials::Password { email, password } => {
            let email = require(email, "email")?;
            require(password, "password")?;
            let local = email.split('@').next().unwrap_or(email);
            Ok(User::new(local, email, local))
        }
        Credentials::Signup { username, email, password } => {
            let username = require(username, "username")?;
            let email = require(email, "email")?;
            require(password, "password")?;
            Ok(User::new(username, email, username))
        }
        Credentials::Social { provider } => {
            let provider = require(provider, "provider")?;
            Ok(User::new(
                &format!("user_{}", provider),
                &format!("user@{}.com", provider.to_lowercase()),
                "User",
            ))
        }
    }
}

/// Sign in with `credentials` and remember the user.
pub fn init<S: KeyValueStore + ?Sized>(store: &mut S, credentials: &Credentials) -> Result<Session, SessionError> {
    let user = user_for(credentials)?;
    store.set(SESSION_KEY, &serde_json::to_string(&user)?)?;
    info!("Signed in as {}", user.username);
    Ok(Session { user })
}

/// Pick up a session saved by an earlier [`init`].
pub fn restore<S: KeyValueStore + ?Sized>(store: &S) -> Result<Option<Session>, SessionError> {
    match store.get(SESSION_KEY)? {
        Some(raw) => {
            let user: User = serde_json::from_str(&raw)?;
            info!("Restored session for {}", user.username);
            Ok(Some(Session { user }))
        }
        None => Ok(None),
    }
}

/// Sign out, forgetting the saved user.
pub fn teardown<S: KeyValueStore + ?Sized>(store: &mut S, session: Session) -> Result<(), SessionError> {
    store.remove(SESSION_KEY)?;
    info!("Signed out {}", session.user.username);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_password_login_uses_email_local_part() {
        let mut store = MemoryStore::new();
        let session = init(
            &mut store,
            &Credentials::Password { email: "ada@example.com".into(), password: "hunter2".into() },
        )
        .unwrap();

        assert_eq!(session.display_name(), "ada");
        assert_eq!(session.avatar_url(), "https://ui-avatars.com/api/?name=ada&background=random");
        assert_eq!(restore(&store).unwrap(), Some(session));
    }

    #[test]
    fn test_missing_password_is_rejected() {
        let mut store = MemoryStore::new();
        let result = init(&mut store, &Credentials::Password { email: "ada@example.com".into(), password: String::new() });

        assert!(matches!(result, Err(SessionError::MissingField("password"))));
        assert!(restore(&store).unwrap().is_none());
    }

    #[test]
    fn test_missing_field_message_reads_plainly() {
        let mut store = MemoryStore::new();
        let err = init(&mut store, &Credentials::Password { email: String::new(), password: "pw".into() }).unwrap_err();
        assert_eq!(format!("Sign-in failed: {}, try again.", err), "Sign-in failed: missing email, try again.");
    }

    #[test]
    fn test_social_login_and_teardown() {
        let mut store = MemoryStore::new();
        let session = init(&mut store, &Credentials::Social { provider: "GitHub".into() }).unwrap();
        assert_eq!(session.display_name(), "user_GitHub");
        assert_eq!(session.user().email, "user@github.com");

        teardown(&mut store, session).unwrap();
        assert!(restore(&store).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_saved_session() {
        let mut store = MemoryStore::new();
        store.set(SESSION_KEY, "{oops").unwrap();
        assert!(matches!(restore(&store), Err(SessionError::Corrupt(_))));
    }
}
