pub mod resume;
pub mod store;

pub use resume::{
    AUTH_SNAPSHOT_KEY, LocalResume, RESUME_KEY_PREFIX, read_auth_snapshot, write_auth_snapshot,
};
pub use store::{FileKeyValueStore, KeyValueStore, LocalStoreError, MemoryKeyValueStore};
