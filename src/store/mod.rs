//! 持久化存储适配层
//!
//! 拍卖、球员、资料、用户都以 JSON 文档的形式按集合存放，
//! 业务代码只依赖 [`DurableStore`] 提供的五个能力，
//! 具体是文档库还是关系库由实现决定。

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type Document = Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// 过滤条件没有命中任何文档
    #[error("no document matched the filter")]
    NotFound,
    /// 唯一性约束冲突
    #[error("document conflicts with an existing one")]
    Conflict,
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("document serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// 文档过滤条件，语义与 Postgres 的 `jsonb @>` 保持一致
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    /// 顶层字段相等
    Eq(String, Value),
    /// JSON 包含关系，可以表达数组元素匹配（如 `joined_by.email`）
    Contains(Value),
    Any(Vec<Filter>),
    Every(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn contains(pattern: Value) -> Self {
        Filter::Contains(pattern)
    }

    pub fn any(filters: Vec<Filter>) -> Self {
        Filter::Any(filters)
    }

    pub fn every(filters: Vec<Filter>) -> Self {
        Filter::Every(filters)
    }

    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => doc.get(field) == Some(value),
            Filter::Contains(pattern) => json_contains(&Value::Object(doc.clone()), pattern),
            Filter::Any(filters) => filters.iter().any(|f| f.matches(doc)),
            Filter::Every(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

/// `container @> pattern`
pub fn json_contains(container: &Value, pattern: &Value) -> bool {
    match (container, pattern) {
        (Value::Object(c), Value::Object(p)) => p
            .iter()
            .all(|(k, pv)| c.get(k).is_some_and(|cv| json_contains(cv, pv))),
        (Value::Array(c), Value::Array(p)) => p
            .iter()
            .all(|pv| c.iter().any(|cv| json_contains(cv, pv))),
        // jsonb 允许数组直接包含一个标量
        (Value::Array(c), p) if !p.is_object() => c.iter().any(|cv| cv == p),
        (c, p) => c == p,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

impl Sort {
    pub fn asc(field: &str) -> Self {
        Sort {
            field: field.to_string(),
            descending: false,
        }
    }

    pub fn desc(field: &str) -> Self {
        Sort {
            field: field.to_string(),
            descending: true,
        }
    }

    pub(crate) fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let ord = match (a.get(&self.field), b.get(&self.field)) {
            (Some(x), Some(y)) => compare_values(x, y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if self.descending { ord.reverse() } else { ord }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        // 时间戳的小数位数不固定，按时间而不是字典序比较
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// 单文档更新：先做数组去重追加，再浅合并 `set`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Document,
    pub add_to_set: Option<(String, Value)>,
}

impl Update {
    pub fn set(set: Document) -> Self {
        Update {
            set,
            add_to_set: None,
        }
    }

    pub fn add_to_set(mut self, field: &str, value: Value) -> Self {
        self.add_to_set = Some((field.to_string(), value));
        self
    }

    pub(crate) fn apply(&self, doc: &mut Document) {
        if let Some((field, value)) = &self.add_to_set {
            let entry = doc
                .entry(field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !entry.is_array() {
                *entry = Value::Array(Vec::new());
            }
            if let Value::Array(items) = entry {
                if !items.iter().any(|item| json_contains(item, value)) {
                    items.push(value.clone());
                }
            }
        }
        for (k, v) in &self.set {
            doc.insert(k.clone(), v.clone());
        }
    }
}

/// 持久化存储的能力集合
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> StoreResult<Vec<Document>>;

    /// 插入文档并返回新分配的 `id`
    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<String>;

    /// 集合中没有文档命中 `unless` 时才插入，否则返回 `StoreError::Conflict`；
    /// 检查与插入是一个原子步骤
    async fn insert_unique(
        &self,
        collection: &str,
        doc: Document,
        unless: &Filter,
    ) -> StoreResult<String>;

    /// 更新第一个命中的文档并返回更新后的内容，未命中返回 `StoreError::NotFound`
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: Update,
    ) -> StoreResult<Document>;

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<()>;

    async fn exists(&self, collection: &str, filter: &Filter) -> StoreResult<bool>;
}

pub fn to_document<T: Serialize>(value: &T) -> StoreResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

pub fn from_document<T: DeserializeOwned>(doc: Document) -> StoreResult<T> {
    Ok(serde_json::from_value(Value::Object(doc))?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn contains_matches_array_members_by_subset() {
        let auction = doc(json!({
            "created_by": "owner@x.com",
            "joined_by": [{"email": "a@x.com", "is_team_owner": false}]
        }));

        assert!(Filter::contains(json!({"joined_by": [{"email": "a@x.com"}]})).matches(&auction));
        assert!(!Filter::contains(json!({"joined_by": [{"email": "b@x.com"}]})).matches(&auction));
        assert!(Filter::any(vec![
            Filter::eq("created_by", "a@x.com"),
            Filter::contains(json!({"joined_by": [{"email": "a@x.com"}]})),
        ])
        .matches(&auction));
        assert!(!Filter::any(vec![]).matches(&auction));
        assert!(Filter::every(vec![]).matches(&auction));
    }

    #[test]
    fn update_add_to_set_is_idempotent() {
        let mut auction = doc(json!({"joined_by": []}));
        let update = Update::set(doc(json!({"auction_name": "IPL"})))
            .add_to_set("joined_by", json!({"email": "a@x.com"}));

        update.apply(&mut auction);
        update.apply(&mut auction);

        assert_eq!(auction["joined_by"], json!([{"email": "a@x.com"}]));
        assert_eq!(auction["auction_name"], json!("IPL"));
    }

    #[test]
    fn sort_places_missing_fields_last() {
        let a = doc(json!({"player_number": 2}));
        let b = doc(json!({"player_number": 10}));
        let c = doc(json!({}));
        let sort = Sort::asc("player_number");
        assert_eq!(sort.compare(&a, &b), Ordering::Less);
        assert_eq!(sort.compare(&c, &a), Ordering::Greater);
        assert_eq!(Sort::desc("player_number").compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn sort_compares_timestamps_chronologically() {
        let earlier = doc(json!({"created_at": "2026-03-01T10:00:00.123Z"}));
        let later = doc(json!({"created_at": "2026-03-01T10:00:00.123456Z"}));
        assert_eq!(Sort::asc("created_at").compare(&earlier, &later), Ordering::Less);
    }
}
