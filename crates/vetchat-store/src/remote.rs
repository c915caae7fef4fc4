//! Client for a remote REST-over-JSON conversation store.
//!
//! Paths mirror the store's tree:
//!
//! | Call | Request |
//! |------|---------|
//! | fetch | `GET {base}/conversations/{key}` |
//! | fetch_all | `GET {base}/conversations` |
//! | append | `POST {base}/conversations/{key}` → `{"name": id}` |
//! | patch | `PATCH {base}/conversations/{key}` with `{id: {seenByVet: true}}` |
//! | lookup | `GET {base}/participants/{users\|vets}/{id}` |
//!
//! A JSON `null` body means "nothing there".

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use vetchat_shared::constants::FETCH_TIMEOUT_MS;
use vetchat_shared::{
    AppendReceipt, ConversationKey, Message, ParticipantId, ParticipantProfile, RawBag, RecordId,
    RecordPatch, Role,
};

use crate::error::{Result, StoreError};
use crate::store::{ConversationStore, ParticipantDirectory};

/// Where the remote store lives and how long a request may take.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Env: `VETCHAT_STORE_URL`
    /// Default: `http://127.0.0.1:8080`
    pub base_url: String,

    /// Env: `VETCHAT_STORE_TIMEOUT_MS`
    /// Default: 5000 ms
    pub request_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout: Duration::from_millis(FETCH_TIMEOUT_MS),
        }
    }
}

impl RemoteConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("VETCHAT_STORE_URL") {
            if url.starts_with("http://") || url.starts_with("https://") {
                config.base_url = url;
            } else {
                warn!(value = %url, "Invalid VETCHAT_STORE_URL, using default");
            }
        }

        if let Ok(val) = std::env::var("VETCHAT_STORE_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.request_timeout = Duration::from_millis(ms),
                _ => warn!(value = %val, "Invalid VETCHAT_STORE_TIMEOUT_MS, using default"),
            }
        }

        config
    }
}

pub struct HttpStore {
    client: Client,
    base_url: Url,
}

impl HttpStore {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| StoreError::Unavailable(format!("invalid store URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Unavailable(format!(
                "store URL cannot carry a path: {base_url}"
            )));
        }
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, base_url })
    }

    // Segments are percent-encoded, so ids never escape their path position.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ConversationStore for HttpStore {
    async fn fetch(&self, key: &ConversationKey) -> Result<RawBag> {
        let response = self
            .client
            .get(self.url(&["conversations", key.as_str()]))
            .send()
            .await?;
        let bag: Option<RawBag> = Self::read_json(response).await?;
        Ok(bag.unwrap_or_default())
    }

    async fn fetch_all(&self) -> Result<BTreeMap<ConversationKey, RawBag>> {
        let response = self.client.get(self.url(&["conversations"])).send().await?;
        let tree: Option<BTreeMap<String, RawBag>> = Self::read_json(response).await?;

        let mut out = BTreeMap::new();
        for (key, bag) in tree.unwrap_or_default() {
            match ConversationKey::parse(&key) {
                Some(key) => {
                    out.insert(key, bag);
                }
                None => warn!(key = %key, "ignoring conversation with invalid key"),
            }
        }
        Ok(out)
    }

    async fn append(&self, key: &ConversationKey, message: &Message) -> Result<RecordId> {
        let response = self
            .client
            .post(self.url(&["conversations", key.as_str()]))
            .json(message)
            .send()
            .await?;
        let receipt: AppendReceipt = Self::read_json(response).await?;
        debug!(key = %key, record = %receipt.name, "appended record");
        Ok(receipt.name)
    }

    async fn patch(
        &self,
        key: &ConversationKey,
        patches: &BTreeMap<RecordId, RecordPatch>,
    ) -> Result<()> {
        let response = self
            .client
            .patch(self.url(&["conversations", key.as_str()]))
            .json(patches)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ParticipantDirectory for HttpStore {
    async fn lookup(&self, role: Role, id: &ParticipantId) -> Result<Option<ParticipantProfile>> {
        let response = self
            .client
            .get(self.url(&["participants", role.collection(), id.as_str()]))
            .send()
            .await?;
        Self::read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let config = RemoteConfig {
            base_url: "http://store.local:9000/".to_string(),
            ..RemoteConfig::default()
        };
        let store = HttpStore::new(&config).unwrap();
        assert_eq!(
            store.url(&["conversations", "U1_V1"]).as_str(),
            "http://store.local:9000/conversations/U1_V1"
        );
        assert_eq!(
            store.url(&["participants", Role::Vet.collection(), "V1"]).as_str(),
            "http://store.local:9000/participants/vets/V1"
        );
        assert_eq!(
            store.url(&["participants", "users", "a/b c"]).as_str(),
            "http://store.local:9000/participants/users/a%2Fb%20c"
        );
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let config = RemoteConfig {
            base_url: "not a url".to_string(),
            ..RemoteConfig::default()
        };
        assert!(matches!(
            HttpStore::new(&config),
            Err(StoreError::Unavailable(_))
        ));
    }

    mod served {
        use std::sync::Arc;

        use axum::extract::{Path, State};
        use axum::http::StatusCode;
        use axum::response::{IntoResponse, Response};
        use axum::routing::get;
        use axum::{Json, Router};
        use serde_json::Value;

        use super::*;
        use crate::memory::{MemoryDirectory, MemoryStore};

        const DOWN: &str = "U9_down";
        const LOCKED: &str = "U9_locked";

        #[derive(Clone, Default)]
        struct Backend {
            store: Arc<MemoryStore>,
            directory: Arc<MemoryDirectory>,
        }

        // Empty subtrees come back as JSON null, like a tree store does.
        fn or_null<T: serde::Serialize>(value: T, empty: bool) -> Json<Value> {
            if empty {
                Json(Value::Null)
            } else {
                Json(serde_json::to_value(value).unwrap())
            }
        }

        async fn all(State(b): State<Backend>) -> Json<Value> {
            let tree = b.store.fetch_all().await.unwrap();
            let empty = tree.is_empty();
            or_null(tree, empty)
        }

        async fn one(State(b): State<Backend>, Path(key): Path<String>) -> Response {
            if key == DOWN {
                return (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response();
            }
            let key = ConversationKey::parse(&key).unwrap();
            let bag = b.store.fetch(&key).await.unwrap();
            let empty = bag.is_empty();
            or_null(bag, empty).into_response()
        }

        async fn append(
            State(b): State<Backend>,
            Path(key): Path<String>,
            Json(message): Json<Message>,
        ) -> Json<AppendReceipt> {
            let key = ConversationKey::parse(&key).unwrap();
            let name = b.store.append(&key, &message).await.unwrap();
            Json(AppendReceipt { name })
        }

        async fn patch(
            State(b): State<Backend>,
            Path(key): Path<String>,
            Json(patches): Json<BTreeMap<RecordId, RecordPatch>>,
        ) -> StatusCode {
            if key == LOCKED {
                return StatusCode::FORBIDDEN;
            }
            let key = ConversationKey::parse(&key).unwrap();
            b.store.patch(&key, &patches).await.unwrap();
            StatusCode::OK
        }

        async fn participant(
            State(b): State<Backend>,
            Path((collection, id)): Path<(String, String)>,
        ) -> Json<Option<ParticipantProfile>> {
            let role = Role::from_collection(&collection).unwrap();
            Json(b.directory.lookup(role, &ParticipantId::from(id)).await.unwrap())
        }

        async fn serve(backend: Backend) -> HttpStore {
            let app = Router::new()
                .route("/conversations", get(all))
                .route("/conversations/:key", get(one).post(append).patch(patch))
                .route("/participants/:collection/:id", get(participant))
                .with_state(backend);

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            HttpStore::new(&RemoteConfig {
                base_url: format!("http://{addr}"),
                ..RemoteConfig::default()
            })
            .unwrap()
        }

        fn pid(s: &str) -> ParticipantId {
            ParticipantId::from(s)
        }

        #[tokio::test]
        async fn test_null_bodies_mean_nothing_there() {
            let store = serve(Backend::default()).await;
            let key = vetchat_shared::resolve(&pid("U1"), &pid("V1")).unwrap();

            assert!(store.fetch_all().await.unwrap().is_empty());
            assert!(store.fetch(&key).await.unwrap().is_empty());
            assert_eq!(store.lookup(Role::Vet, &pid("V1")).await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_append_fetch_patch_lookup() {
            let backend = Backend::default();
            backend
                .directory
                .upsert(
                    Role::Vet,
                    pid("dr who"),
                    ParticipantProfile {
                        username: "The Doctor".into(),
                        profile_image: None,
                        block: false,
                    },
                )
                .await;
            let store = serve(backend.clone()).await;

            let key = vetchat_shared::resolve(&pid("U1"), &pid("dr who")).unwrap();
            let message =
                Message::compose(Role::Owner, &pid("U1"), &pid("dr who"), "limping", 100)
                    .unwrap();
            let id = store.append(&key, &message).await.unwrap();

            let bag = store.fetch(&key).await.unwrap();
            assert_eq!(bag[&id]["text"], "limping");
            assert_eq!(bag[&id]["seenByVet"], false);

            let mut patches = BTreeMap::new();
            patches.insert(id.clone(), RecordPatch::seen(Role::Vet));
            store.patch(&key, &patches).await.unwrap();
            assert_eq!(backend.store.patch_calls(), 1);

            let tree = store.fetch_all().await.unwrap();
            assert_eq!(tree[&key][&id]["seenByVet"], true);

            let profile = store.lookup(Role::Vet, &pid("dr who")).await.unwrap();
            assert_eq!(profile.map(|p| p.username), Some("The Doctor".to_string()));
            assert_eq!(store.lookup(Role::Owner, &pid("dr who")).await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_error_statuses_are_classified() {
            let store = serve(Backend::default()).await;

            let down = ConversationKey::parse(DOWN).unwrap();
            match store.fetch(&down).await {
                Err(e @ StoreError::Status { status: 503, .. }) => {
                    assert!(e.is_transient());
                    assert!(e.to_string().contains("maintenance"));
                }
                other => panic!("expected 503, got {other:?}"),
            }

            let locked = ConversationKey::parse(LOCKED).unwrap();
            match store.patch(&locked, &BTreeMap::new()).await {
                Err(e @ StoreError::Status { status: 403, .. }) => assert!(!e.is_transient()),
                other => panic!("expected 403, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_default_config() {
        let config = RemoteConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }
}
