//! 旁路缓存（cache-aside）
//!
//! 读路径：先查缓存，命中且能解码则直接返回；解码失败视为未命中并删除该键；
//! 未命中时调用查询函数读取持久化存储，再尽力回填缓存。
//! 写路径：持久化写入成功之后、响应返回之前，同步删除所有可能包含该实体的键。
//!
//! 缓存层的任何失败都只记录日志，持久化存储始终是事实来源。
//!
//! # 一致性窗口
//!
//! 读请求未命中、查完存储、尚未回填的这段时间里，如果另一个请求完成了写入并执行了失效，
//! 读请求随后回填的就是写入之前的数据。这份旧数据会一直留到 TTL 过期。
//! 消除该窗口需要带版本号的条件写入，这里没有做。
//! 按模式失效（`keys_matching` + 删除）在并发回填时同样只保证最终一致。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::{CacheError, CacheKey, CacheResult, VolatileStore};
use crate::error::AppError;

/// 决定一次查询结果是否值得写入缓存
///
/// 列表默认只缓存非空结果：空列表一旦被缓存，之后的插入在 TTL 内都不可见。
pub trait Cacheable {
    fn should_cache(&self) -> bool {
        true
    }
}

impl<T> Cacheable for Vec<T> {
    fn should_cache(&self) -> bool {
        !self.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Cache,
    Store,
}

#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    pub value: T,
    pub source: ReadSource,
}

impl<T> CacheRead<T> {
    pub fn from_cache(&self) -> bool {
        self.source == ReadSource::Cache
    }
}

/// 一次失效操作的结果，调用方通常只用于日志
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    pub attempted: usize,
    pub removed: u64,
    pub failed: Vec<String>,
}

impl InvalidationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct CacheAside {
    cache: Arc<dyn VolatileStore>,
    deadline: Duration,
}

impl CacheAside {
    pub fn new(cache: Arc<dyn VolatileStore>, deadline: Duration) -> Self {
        Self { cache, deadline }
    }

    pub fn backend(&self) -> &Arc<dyn VolatileStore> {
        &self.cache
    }

    pub async fn read_through<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        query: F,
    ) -> Result<CacheRead<T>, AppError>
    where
        T: Serialize + DeserializeOwned + Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        match self.bounded(self.cache.get(key.as_str())).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    debug!(key = %key, "cache hit");
                    return Ok(CacheRead {
                        value,
                        source: ReadSource::Cache,
                    });
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "discarding undecodable cache entry");
                    self.discard(key).await;
                }
            },
            Ok(None) => debug!(key = %key, "cache miss"),
            Err(e) => warn!(key = %key, error = %e, "cache read failed, falling back to store"),
        }

        let value = query().await?;

        if value.should_cache() {
            self.populate(key, &value, ttl).await;
        }

        Ok(CacheRead {
            value,
            source: ReadSource::Store,
        })
    }

    /// 删除给定的全部键；单个键失败不会中断其余键的删除
    pub async fn invalidate(&self, keys: &[CacheKey]) -> InvalidationReport {
        let deletes = keys.iter().map(|key| async move {
            let owned = [key.to_string()];
            let outcome = self.bounded(self.cache.delete(&owned)).await;
            (key, outcome)
        });

        let mut report = InvalidationReport {
            attempted: keys.len(),
            ..Default::default()
        };
        for (key, outcome) in join_all(deletes).await {
            match outcome {
                Ok(n) => report.removed += n,
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to invalidate cache key");
                    report.failed.push(key.to_string());
                }
            }
        }
        debug!(attempted = report.attempted, removed = report.removed, "cache keys invalidated");
        report
    }

    /// 按模式失效，枚举与删除之间可能有并发回填，只保证最终一致
    pub async fn invalidate_matching(&self, pattern: &str) -> InvalidationReport {
        let keys = match self.bounded(self.cache.keys_matching(pattern)).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(pattern, error = %e, "failed to enumerate cache keys");
                return InvalidationReport {
                    attempted: 0,
                    removed: 0,
                    failed: vec![pattern.to_string()],
                };
            }
        };

        let mut report = InvalidationReport {
            attempted: keys.len(),
            ..Default::default()
        };
        for chunk in keys.chunks(100) {
            match self.bounded(self.cache.delete(chunk)).await {
                Ok(n) => report.removed += n,
                Err(e) => {
                    warn!(pattern, error = %e, "failed to delete matched cache keys");
                    report.failed.extend(chunk.iter().cloned());
                }
            }
        }
        report
    }

    async fn populate<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to serialize value for cache");
                return;
            }
        };
        if let Err(e) = self.bounded(self.cache.set(key.as_str(), &json, ttl)).await {
            warn!(key = %key, error = %e, "failed to populate cache");
        }
    }

    async fn discard(&self, key: &CacheKey) {
        let keys = [key.as_str().to_string()];
        if let Err(e) = self.bounded(self.cache.delete(&keys)).await {
            warn!(key = %key, error = %e, "failed to delete corrupt cache entry");
        }
    }

    async fn bounded<T>(&self, fut: impl Future<Output = CacheResult<T>>) -> CacheResult<T> {
        tokio::time::timeout(self.deadline, fut)
            .await
            .unwrap_or(Err(CacheError::Timeout))
    }
}
