/// Profile storage: user display data in a sled DB
use crate::error::{LostFoundError, Result};
use crate::ids::UserId;
use crate::models::Profile;
use std::path::Path;
use tracing::{debug, info};

pub struct ProfileStore {
    db: sled::Db,
}

impl ProfileStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db = sled::open(data_dir.join("profiles.db"))
            .map_err(|e| LostFoundError::Storage(format!("profiles DB: {}", e)))?;
        Ok(Self { db })
    }

    pub fn upsert(&self, p: &Profile) -> Result<()> {
        let val = serde_json::to_vec(p).map_err(LostFoundError::Serialization)?;
        self.db
            .insert(p.id.as_str().as_bytes(), val)
            .map_err(|e| LostFoundError::Storage(format!("upsert profile: {}", e)))?;
        debug!("Stored profile {}", p.id);
        Ok(())
    }

    pub fn get(&self, id: &UserId) -> Result<Option<Profile>> {
        match self
            .db
            .get(id.as_str().as_bytes())
            .map_err(|e| LostFoundError::Storage(format!("get profile: {}", e)))?
        {
            Some(val) => {
                let p = serde_json::from_slice::<Profile>(&val)
                    .map_err(LostFoundError::Serialization)?;
                Ok(Some(p))
            }
            None => Ok(None),
        }
    }

    /// Store `fallback` unless a profile already exists; returns the stored one
    pub fn ensure(&self, fallback: &Profile) -> Result<Profile> {
        if let Some(existing) = self.get(&fallback.id)? {
            return Ok(existing);
        }
        info!("Profile missing for {}, creating it", fallback.id);
        self.upsert(fallback)?;
        Ok(fallback.clone())
    }
}

impl Clone for ProfileStore {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn profile(id: &str, name: &str) -> Profile {
        Profile {
            id: UserId::new(id).unwrap(),
            name: name.to_string(),
            email: format!("{}@example.com", id),
            avatar_url: String::new(),
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn test_profile_upsert_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = ProfileStore::new(temp_dir.path()).unwrap();

        store.upsert(&profile("u1", "Ana")).unwrap();
        let got = store.get(&UserId::new("U1").unwrap()).unwrap().unwrap();
        assert_eq!(got.name, "Ana");

        assert!(store.get(&UserId::new("nobody").unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_ensure_keeps_existing_profile() {
        let temp_dir = TempDir::new().unwrap();
        let store = ProfileStore::new(temp_dir.path()).unwrap();

        store.upsert(&profile("u1", "Ana")).unwrap();
        let kept = store.ensure(&profile("u1", "Someone Else")).unwrap();
        assert_eq!(kept.name, "Ana");

        let created = store.ensure(&profile("u2", "Ben")).unwrap();
        assert_eq!(created.name, "Ben");
        assert!(store.get(&created.id).unwrap().is_some());
    }
}
