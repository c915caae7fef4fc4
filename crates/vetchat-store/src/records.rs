use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};
use uuid::Uuid;

use vetchat_shared::{ConversationKey, Message, RawBag, RecordId, RecordPatch};

use crate::database::{Database, SqliteStore};
use crate::error::Result;
use crate::store::ConversationStore;

impl Database {
    pub fn insert_record(
        &self,
        key: &ConversationKey,
        id: &RecordId,
        body: &serde_json::Value,
    ) -> Result<()> {
        let now = Utc::now().timestamp_millis();

        self.conn().execute(
            "INSERT INTO records (conversation_key, record_id, body, inserted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key.as_str(), id.as_str(), body.to_string(), now],
        )?;
        Ok(())
    }

    pub fn records_for(&self, key: &ConversationKey) -> Result<RawBag> {
        let mut stmt = self.conn().prepare(
            "SELECT record_id, body FROM records WHERE conversation_key = ?1",
        )?;
        let rows = stmt.query_map(params![key.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut bag = RawBag::new();
        for row in rows {
            let (id, body) = row?;
            bag.insert(RecordId::new(id), parse_body(&body));
        }
        Ok(bag)
    }

    pub fn all_records(&self) -> Result<BTreeMap<ConversationKey, RawBag>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT conversation_key, record_id, body FROM records")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut tree: BTreeMap<ConversationKey, RawBag> = BTreeMap::new();
        for row in rows {
            let (key, id, body) = row?;
            let Some(key) = ConversationKey::parse(&key) else {
                warn!(key = %key, "skipping records under invalid conversation key");
                continue;
            };
            tree.entry(key)
                .or_default()
                .insert(RecordId::new(id), parse_body(&body));
        }
        Ok(tree)
    }

    /// Apply all patches in one transaction. Returns how many records changed.
    pub fn patch_records(
        &mut self,
        key: &ConversationKey,
        patches: &BTreeMap<RecordId, RecordPatch>,
    ) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;
        let mut changed = 0;

        for (id, patch) in patches {
            let body: Option<String> = tx
                .query_row(
                    "SELECT body FROM records WHERE conversation_key = ?1 AND record_id = ?2",
                    params![key.as_str(), id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(body) = body else {
                debug!(key = %key, record = %id, "patch for unknown record skipped");
                continue;
            };

            let mut value = parse_body(&body);
            if patch.apply_to(&mut value) {
                tx.execute(
                    "UPDATE records SET body = ?1 WHERE conversation_key = ?2 AND record_id = ?3",
                    params![value.to_string(), key.as_str(), id.as_str()],
                )?;
                changed += 1;
            }
        }

        tx.commit()?;
        Ok(changed)
    }
}

// Corrupt bodies still come back as records so the ordering layer can skip
// them the same way it skips malformed records from a remote store.
fn parse_body(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|_| serde_json::Value::String(body.to_string()))
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn fetch(&self, key: &ConversationKey) -> Result<RawBag> {
        self.db().records_for(key)
    }

    async fn fetch_all(&self) -> Result<BTreeMap<ConversationKey, RawBag>> {
        self.db().all_records()
    }

    async fn append(&self, key: &ConversationKey, message: &Message) -> Result<RecordId> {
        let id = RecordId::new(Uuid::new_v4().simple().to_string());
        let body = serde_json::to_value(message)?;
        self.db().insert_record(key, &id, &body)?;
        debug!(key = %key, record = %id, "appended record");
        Ok(id)
    }

    async fn patch(
        &self,
        key: &ConversationKey,
        patches: &BTreeMap<RecordId, RecordPatch>,
    ) -> Result<()> {
        let changed = self.db().patch_records(key, patches)?;
        debug!(key = %key, requested = patches.len(), changed, "patched records");
        Ok(())
    }
}
