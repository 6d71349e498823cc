//! 缓存模块
//!
//! [`VolatileStore`] 是易失键值存储的能力接口，既用作读穿缓存，也用来暂存 OTP。
//! [`CacheAside`] 在请求处理与持久化存储之间负责填充与失效。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod aside;
pub mod keys;
pub mod memory;
pub mod redis_cache;

pub use aside::{CacheAside, CacheRead, Cacheable, InvalidationReport, ReadSource};
pub use keys::{AuctionScope, CacheKey};
pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache operation timed out")]
    Timeout,
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait VolatileStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// 键不存在时才写入，返回是否写入
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool>;

    /// 返回实际删除的键数量
    async fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    /// 当前值等于 `expected` 时删除该键，比较和删除是一个原子步骤
    async fn take_if_equal(&self, key: &str, expected: &str) -> CacheResult<bool>;

    /// glob 风格匹配（`*`、`?`）
    async fn keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// 固定窗口计数器，首次递增时设置窗口过期时间
    async fn increment(&self, key: &str, window: Duration) -> CacheResult<u64>;
}
