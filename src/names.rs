use log::info;

use crate::storage::{KeyValueStore, StorageError};

pub const USER_NAME_KEY: &str = "chat_user_name";
pub const PARTNER_NAME_KEY: &str = "chat_partner_name";
pub const DEFAULT_USER_NAME: &str = "You";
pub const DEFAULT_PARTNER_NAME: &str = "Lover";

/// Display labels for both sides of the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatNames {
    user: String,
    partner: String,
}

impl Default for ChatNames {
    fn default() -> Self {
        ChatNames {
            user: DEFAULT_USER_NAME.to_string(),
            partner: DEFAULT_PARTNER_NAME.to_string(),
        }
    }
}

impl ChatNames {
    /// Read both names, falling back to the defaults for missing or empty values.
    pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> Result<Self, StorageError> {
        let read = |key: &str, fallback: &str| -> Result<String, StorageError> {
            Ok(store
                .get(key)?
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| fallback.to_string()))
        };

        Ok(ChatNames {
            user: read(USER_NAME_KEY, DEFAULT_USER_NAME)?,
            partner: read(PARTNER_NAME_KEY, DEFAULT_PARTNER_NAME)?,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn partner(&self) -> &str {
        &self.partner
    }

    /// Rename ourselves. Blank names are ignored and return false.
    pub fn rename_user<S: KeyValueStore + ?Sized>(&mut self, store: &mut S, name: &str) -> Result<bool, StorageError> {
        let Some(name) = clean(name) else {
            return Ok(false);
        };
        store.set(USER_NAME_KEY, name)?;
        info!("User display name changed to {}", name);
        self.user = name.to_string();
        Ok(true)
    }

    /// Rename the peer. Blank names are ignored and return false.
    pub fn rename_partner<S: KeyValueStore + ?Sized>(&mut self, store: &mut S, name: &str) -> Result<bool, StorageError> {
        let Some(name) = clean(name) else {
            return Ok(false);
        };
        store.set(PARTNER_NAME_KEY, name)?;
        info!("Partner display name changed to {}", name);
        self.partner = name.to_string();
        Ok(true)
    }
}

fn clean(name: &str) -> Option<&str> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
