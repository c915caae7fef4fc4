use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use vetchat_shared::{ParticipantId, ParticipantProfile, Role};

use crate::database::{Database, SqliteStore};
use crate::error::{Result, StoreError};
use crate::store::ParticipantDirectory;

impl Database {
    pub fn upsert_participant(
        &self,
        role: Role,
        id: &ParticipantId,
        profile: &ParticipantProfile,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO participants (role, id, username, profile_image, blocked)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(role, id) DO UPDATE SET
                username = excluded.username,
                profile_image = excluded.profile_image,
                blocked = excluded.blocked",
            params![
                role.collection(),
                id.as_str(),
                profile.username,
                profile.profile_image,
                profile.block,
            ],
        )?;
        Ok(())
    }

    pub fn get_participant(
        &self,
        role: Role,
        id: &ParticipantId,
    ) -> Result<Option<ParticipantProfile>> {
        let profile = self
            .conn()
            .query_row(
                "SELECT username, profile_image, blocked FROM participants
                 WHERE role = ?1 AND id = ?2",
                params![role.collection(), id.as_str()],
                |row| {
                    Ok(ParticipantProfile {
                        username: row.get(0)?,
                        profile_image: row.get(1)?,
                        block: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    /// Set or clear the administrative block flag.
    pub fn set_blocked(&self, role: Role, id: &ParticipantId, blocked: bool) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE participants SET blocked = ?1 WHERE role = ?2 AND id = ?3",
            params![blocked, role.collection(), id.as_str()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

impl SqliteStore {
    pub fn upsert_participant(
        &self,
        role: Role,
        id: &ParticipantId,
        profile: &ParticipantProfile,
    ) -> Result<()> {
        self.db().upsert_participant(role, id, profile)
    }

    pub fn set_blocked(&self, role: Role, id: &ParticipantId, blocked: bool) -> Result<()> {
        self.db().set_blocked(role, id, blocked)
    }
}

#[async_trait]
impl ParticipantDirectory for SqliteStore {
    async fn lookup(&self, role: Role, id: &ParticipantId) -> Result<Option<ParticipantProfile>> {
        self.db().get_participant(role, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> ParticipantProfile {
        ParticipantProfile {
            username: name.to_string(),
            profile_image: Some(format!("https://img.example/{name}.png")),
            block: false,
        }
    }

    #[tokio::test]
    async fn test_upsert_lookup_block() {
        let store = SqliteStore::new(Database::open_in_memory().unwrap());
        let vet = ParticipantId::from("V1");

        store.upsert_participant(Role::Vet, &vet, &profile("dr-who")).unwrap();
        store.upsert_participant(Role::Vet, &vet, &profile("dr-house")).unwrap();

        let found = store.lookup(Role::Vet, &vet).await.unwrap().unwrap();
        assert_eq!(found.username, "dr-house");
        assert!(!found.block);

        store.set_blocked(Role::Vet, &vet, true).unwrap();
        assert!(store.lookup(Role::Vet, &vet).await.unwrap().unwrap().block);

        // Same id in the other collection is a different participant.
        assert!(store.lookup(Role::Owner, &vet).await.unwrap().is_none());
        assert!(matches!(
            store.set_blocked(Role::Owner, &vet, true),
            Err(StoreError::NotFound)
        ));
    }
}
