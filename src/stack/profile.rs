//! Environment profiles
//!
//! An environment profile is the resolved set of key/value configuration
//! strings bound into a service's process environment. Profiles are built
//! once at declaration time and copied verbatim at resolution time; no
//! interpolation or templating is evaluated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An ordered mapping of environment variable names to string values.
///
/// Keys are unique; values are plain strings with no nested structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvProfile(BTreeMap<String, String>);

impl EnvProfile {
    /// Create an empty profile
    pub fn new() -> Self {
        Self::default()
    }

    /// The `dev` profile bound to the `web` service
    pub fn dev() -> Self {
        Self::standup_base().with("DEBUG", "True")
    }

    /// The `prod` profile: identical to `dev` except for the debug flag
    pub fn prod() -> Self {
        Self::standup_base().with("DEBUG", "False")
    }

    /// The fixed test profile used by the test bootstrap.
    ///
    /// The database is ephemeral, the secret key is a known constant, and
    /// the identity-provider values are stand-ins that satisfy
    /// configuration-presence checks without contacting a real provider.
    pub fn test() -> Self {
        Self::new()
            .with("DJANGO_SETTINGS_MODULE", "standup.settings")
            .with("DATABASE_URL", "sqlite://")
            .with("SECRET_KEY", "itsasekrit")
            .with(
                "STATICFILES_STORAGE",
                "django.contrib.staticfiles.storage.StaticFilesStorage",
            )
            .with("AUTH0_CLIENT_ID", "ou812")
            .with("AUTH0_CLIENT_SECRET", "secret_ou812")
            .with("AUTH0_DOMAIN", "foo")
            .with("AUTH0_CALLBACK_URL", "http://testserver/auth/login")
    }

    /// Keys shared by the `dev` and `prod` profiles
    fn standup_base() -> Self {
        Self::new()
            .with("DATABASE_URL", "postgres://postgres@db/postgres")
            .with("ALLOWED_HOSTS", "localhost,127.0.0.1")
            .with("SECRET_KEY", "itsasekrit")
    }

    /// Set a variable, replacing any previous value for the key
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    /// Insert a variable in place
    pub fn set(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    /// Iterate over all variables in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Number of variables in the profile
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the profile has no variables
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for EnvProfile {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
