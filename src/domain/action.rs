use serde::{Deserialize, Serialize};

/// The three operations the API-under-test accepts on a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiAction {
    Login,
    Action,
    Logout,
}

impl ApiAction {
    pub const ALL: [ApiAction; 3] = [ApiAction::Login, ApiAction::Action, ApiAction::Logout];

    pub fn as_str(&self) -> &str {
        match self {
            ApiAction::Login => "LOGIN",
            ApiAction::Action => "ACTION",
            ApiAction::Logout => "LOGOUT",
        }
    }
}

impl std::fmt::Display for ApiAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
