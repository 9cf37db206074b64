/// Signed-in identity, owned by the caller and passed where it is needed
use crate::error::{LostFoundError, Result};
use crate::ids::UserId;
use crate::models::Profile;
use tracing::info;

#[derive(Debug, Default)]
pub struct Session {
    user: Option<Profile>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate after a successful login; replaces any previous user
    pub fn sign_in(&mut self, profile: Profile) {
        info!("Session started for {}", profile.id);
        self.user = Some(profile);
    }

    /// Clear on logout; returns the user that was signed in, if any
    pub fn sign_out(&mut self) -> Option<Profile> {
        let previous = self.user.take();
        if let Some(p) = &previous {
            info!("Session ended for {}", p.id);
        }
        previous
    }

    pub fn user(&self) -> Option<&Profile> {
        self.user.as_ref()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref().map(|p| &p.id)
    }

    pub fn require_user(&self) -> Result<&Profile> {
        self.user
            .as_ref()
            .ok_or_else(|| LostFoundError::Unauthorized("not signed in".to_string()))
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_session_lifecycle() {
        let mut session = Session::new();
        assert!(session.require_user().is_err());

        session.sign_in(Profile {
            id: UserId::new("u1").unwrap(),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            avatar_url: String::new(),
            joined_at: Utc::now(),
        });
        assert!(session.is_signed_in());
        assert_eq!(session.user_id().unwrap().as_str(), "u1");

        let ended = session.sign_out().unwrap();
        assert_eq!(ended.name, "Ana");
        assert!(session.user().is_none());
        assert!(session.sign_out().is_none());
    }
}
