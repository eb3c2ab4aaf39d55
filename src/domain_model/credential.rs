use serde::{Deserialize, Serialize};
use std::fmt;

pub const ACCESS_TOKEN_KEY: &str = "token";
pub const REFRESH_TOKEN_KEY: &str = "refresh";
pub const ROLE_KEY: &str = "role";
pub const USER_KEY: &str = "user";

/// Every key that belongs to the signed-in session. Logging out removes all of them.
pub const SESSION_KEYS: [&str; 4] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, ROLE_KEY, USER_KEY];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

impl AccessToken {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub access: AccessToken,
    pub refresh: Option<RefreshToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Pandit,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Pandit => write!(f, "pandit"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "pandit" => Ok(Role::Pandit),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}
