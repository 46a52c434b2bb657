pub mod memory;
pub mod model;
#[cfg(feature = "distributed")]
pub mod redis;
pub mod traits;

pub use memory::{MemoryStore, StoreStats};
pub use model::LoadStatus;
#[cfg(feature = "distributed")]
pub use redis::RedisStore;
pub use traits::KvStore;
