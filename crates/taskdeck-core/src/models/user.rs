use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn display_name(&self) -> String {
        if !self.full_name.trim().is_empty() {
            return self.full_name.trim().to_string();
        }
        let joined = format!("{} {}", self.first_name, self.last_name);
        if joined.trim().is_empty() {
            self.username.clone()
        } else {
            joined.trim().to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginData {
    pub username: String,
    pub password: String,
}

impl LoginData {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

/// `POST /auth/login/` response
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
}

/// `POST /auth/refresh/` response
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RefreshResponse {
    pub access: String,
}

/// `POST /auth/register/` may wrap the user or return it bare
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RegisterResponse {
    Wrapped { user: User },
    Bare(User),
}

impl RegisterResponse {
    pub fn into_user(self) -> User {
        match self {
            RegisterResponse::Wrapped { user } | RegisterResponse::Bare(user) => user,
        }
    }
}

/// `PUT /auth/profile/` may wrap the user next to a message
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ProfileResponse {
    Wrapped { user: User },
    Bare(User),
}

impl ProfileResponse {
    pub fn into_user(self) -> User {
        match self {
            ProfileResponse::Wrapped { user } | ProfileResponse::Bare(user) => user,
        }
    }
}
