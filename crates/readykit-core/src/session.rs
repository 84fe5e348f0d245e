use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    /// Also covers any role name this build does not know.
    #[default]
    #[serde(other)]
    Student,
}

/// Signed-in user, supplied by whatever handles authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Session {
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
}

impl Session {
    pub fn new(email: impl Into<String>, role: Role) -> Self {
        Self {
            email: email.into(),
            role,
            state: None,
            district: None,
        }
    }

    pub fn with_location(mut self, state: impl Into<String>, district: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self.district = Some(district.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
