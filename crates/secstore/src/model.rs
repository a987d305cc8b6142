//! Persisted security records and their store aliases.
//!
//! Each record kind lives in its own file as a JSON array, held by an
//! [`ObjectStore`]. Field defaults are chosen so that files written by older
//! versions (with fields missing) still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compare;
use crate::credential::{random, CredentialFormat, EncodedCredential};
use crate::profile::{DecodeReport, EncodedProfile, ProfileCodec, PropertyCollection};
use crate::storage::ObjectStore;
use crate::time;

/// Store of every user record.
pub type UserStore = ObjectStore<Vec<User>>;
/// Store of every role record.
pub type RoleStore = ObjectStore<Vec<Role>>;
/// Store of every profile record.
pub type ProfileStore = ObjectStore<Vec<Profile>>;

// ── Credential view ──────────────────────────────────────────────────────────

/// A stored secret together with the format it was encoded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub password: String,
    pub salt: String,
    pub format: CredentialFormat,
}

// ── User ─────────────────────────────────────────────────────────────────────

/// A membership user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    /// Opaque unique key, 32 hex chars.
    pub user_key: String,
    pub user_name: String,
    pub password: String,
    pub password_salt: String,
    pub email: String,
    pub password_question: String,
    pub password_answer: String,
    pub comment: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub last_activity_date: DateTime<Utc>,
    pub last_login_date: DateTime<Utc>,
    pub last_password_change_date: DateTime<Utc>,
    /// `None` when the user has never been locked out.
    pub last_lockout_date: Option<DateTime<Utc>>,
    pub is_approved: bool,
    pub is_locked_out: bool,
    pub failed_password_attempt_count: u32,
}

impl Default for User {
    fn default() -> Self {
        Self {
            user_key: String::new(),
            user_name: String::new(),
            password: String::new(),
            password_salt: String::new(),
            email: String::new(),
            password_question: String::new(),
            password_answer: String::new(),
            comment: None,
            creation_date: time::now(),
            last_activity_date: time::epoch(),
            last_login_date: time::epoch(),
            last_password_change_date: time::epoch(),
            last_lockout_date: None,
            is_approved: true,
            is_locked_out: false,
            failed_password_attempt_count: 0,
        }
    }
}

impl User {
    /// A new, approved user with a fresh key.
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_key: hex::encode(random::random_bytes::<16>()),
            user_name: user_name.into(),
            ..Self::default()
        }
    }

    /// The stored password as a credential of `format`.
    pub fn credential(&self, format: CredentialFormat) -> Credential {
        Credential {
            password: self.password.clone(),
            salt: self.password_salt.clone(),
            format,
        }
    }

    /// Replace the stored password and stamp the change time.
    pub fn set_credential(&mut self, encoded: EncodedCredential) {
        self.password = encoded.value;
        self.password_salt = encoded.salt;
        self.last_password_change_date = time::now();
    }

    pub fn name_matches(&self, name: &str, case_sensitive: bool) -> bool {
        compare::equals(&self.user_name, name, case_sensitive)
    }
}

// ── Role ─────────────────────────────────────────────────────────────────────

/// A named role and the user names assigned to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Role {
    pub name: String,
    pub users: Vec<String>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            users: Vec::new(),
        }
    }

    pub fn contains_user(&self, user_name: &str, case_sensitive: bool) -> bool {
        self.users
            .iter()
            .any(|u| compare::equals(u, user_name, case_sensitive))
    }

    /// Add `user_name` unless already present. Returns whether it was added.
    pub fn add_user(&mut self, user_name: &str, case_sensitive: bool) -> bool {
        if self.contains_user(user_name, case_sensitive) {
            return false;
        }
        self.users.push(user_name.to_string());
        true
    }

    /// Remove every entry matching `user_name`. Returns whether any was removed.
    pub fn remove_user(&mut self, user_name: &str, case_sensitive: bool) -> bool {
        let before = self.users.len();
        self.users
            .retain(|u| !compare::equals(u, user_name, case_sensitive));
        self.users.len() != before
    }
}

// ── Profile ──────────────────────────────────────────────────────────────────

/// A user's encoded profile property bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub user_name: String,
    pub names: String,
    pub values_string: String,
    pub values_binary: String,
    pub last_updated: DateTime<Utc>,
    pub authenticated: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            user_name: String::new(),
            names: String::new(),
            values_string: String::new(),
            values_binary: String::new(),
            last_updated: time::epoch(),
            authenticated: true,
        }
    }
}

impl Profile {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            ..Self::default()
        }
    }

    /// The three encoded fields as a codec input.
    pub fn encoded(&self) -> EncodedProfile {
        EncodedProfile {
            names: self.names.clone(),
            string_values: self.values_string.clone(),
            binary_values: self.values_binary.clone(),
        }
    }

    /// Encode `properties` into this record.
    ///
    /// Returns `false` and leaves the record untouched when nothing
    /// permitted is dirty. Otherwise the encoded fields, `authenticated` and
    /// `last_updated` are replaced.
    pub fn store_properties(
        &mut self,
        codec: &ProfileCodec,
        properties: &PropertyCollection,
        authenticated: bool,
    ) -> bool {
        let Some(encoded) = codec.encode(properties, authenticated) else {
            return false;
        };
        self.names = encoded.names;
        self.values_string = encoded.string_values;
        self.values_binary = encoded.binary_values;
        self.authenticated = authenticated;
        self.last_updated = time::now();
        true
    }

    /// Decode this record's fields into `properties`.
    pub fn load_properties(
        &self,
        codec: &ProfileCodec,
        properties: &mut PropertyCollection,
    ) -> DecodeReport {
        codec.decode(&self.encoded(), properties)
    }
}
