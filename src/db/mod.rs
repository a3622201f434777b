pub mod cache;
pub mod memory;
pub mod postgres;
pub mod redis;
pub mod repository;

mod macros;

pub use self::cache::{Cache, CacheError, CacheKey, CacheStore};
pub use self::memory::{CachePurgerHandle, MemoryStore};
pub use self::postgres::{create_pool, PgWatchlistRepository};
pub use self::redis::{create_redis_client, RedisStore};
pub use self::repository::WatchlistRepository;
