/// Application name
pub const APP_NAME: &str = "vetchat";

/// Separator placed between the two sorted participant ids of a conversation key
pub const KEY_SEPARATOR: &str = "_";

/// Directory collection holding pet owner profiles
pub const OWNER_COLLECTION: &str = "users";

/// Directory collection holding veterinarian profiles
pub const VET_COLLECTION: &str = "vets";

/// Store-side field names of the per-role seen flags
pub const FIELD_SEEN_BY_USER: &str = "seenByUser";
pub const FIELD_SEEN_BY_VET: &str = "seenByVet";

/// Poll period of conversation-list screens and the dashboard badge (ms)
pub const LIST_POLL_INTERVAL_MS: u64 = 2_000;

/// Poll period of an open 1:1 chat (ms)
pub const CHAT_POLL_INTERVAL_MS: u64 = 1_000;

/// Upper bound on a single store fetch before the cycle counts as failed (ms)
pub const FETCH_TIMEOUT_MS: u64 = 5_000;

/// Lowest poll period accepted from configuration (ms)
pub const MIN_POLL_INTERVAL_MS: u64 = 250;

/// Maximum message text size in bytes (16 KiB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;
