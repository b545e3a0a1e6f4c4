use serde::{Deserialize, Serialize};

/// Identity of the signed-in account as handed over by the web layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// An authenticated session: user identity plus a bearer token for the catalog.
///
/// `channel_id` caches the account's own channel once it has been resolved,
/// so later calls during the same sync skip the lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: SessionUser,
    pub access_token: String,
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl Session {
    pub fn new(user: SessionUser, access_token: impl Into<String>) -> Self {
        Self {
            user,
            access_token: access_token.into(),
            channel_id: None,
        }
    }

    pub fn with_channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        !self.user.id.trim().is_empty() && !self.access_token.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_without_token_is_not_authenticated() {
        let user = SessionUser {
            id: "user-1".into(),
            ..SessionUser::default()
        };
        assert!(!Session::new(user.clone(), "").is_authenticated());
        assert!(Session::new(user, "token").is_authenticated());
    }

    #[test]
    fn session_without_user_id_is_not_authenticated() {
        assert!(!Session::new(SessionUser::default(), "token").is_authenticated());
    }
}
