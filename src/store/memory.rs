use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Document, DurableStore, Filter, Sort, StoreError, StoreResult, Update};

/// 进程内文档存储，用于测试和本地开发
///
/// 每个集合按插入顺序保存文档，过滤语义与 [`PgStore`](super::PgStore) 一致。
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Vec<Document>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 集合中的文档数量
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> StoreResult<Vec<Document>> {
        let guard = self.collections.read().await;
        let mut docs: Vec<Document> = guard
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default();
        if let Some(sort) = sort {
            // 稳定排序，相同键保持插入顺序
            docs.sort_by(|a, b| sort.compare(a, b));
        }
        Ok(docs)
    }

    async fn insert(&self, collection: &str, mut doc: Document) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        doc.insert("id".into(), Value::String(id.clone()));
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        Ok(id)
    }

    async fn insert_unique(
        &self,
        collection: &str,
        mut doc: Document,
        unless: &Filter,
    ) -> StoreResult<String> {
        let mut guard = self.collections.write().await;
        let docs = guard.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| unless.matches(d)) {
            return Err(StoreError::Conflict);
        }
        let id = uuid::Uuid::new_v4().to_string();
        doc.insert("id".into(), Value::String(id.clone()));
        docs.push(doc);
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: Update,
    ) -> StoreResult<Document> {
        let mut guard = self.collections.write().await;
        let doc = guard
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| filter.matches(d)))
            .ok_or(StoreError::NotFound)?;
        update.apply(doc);
        Ok(doc.clone())
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<()> {
        let mut guard = self.collections.write().await;
        let docs = guard.get_mut(collection).ok_or(StoreError::NotFound)?;
        let index = docs
            .iter()
            .position(|d| filter.matches(d))
            .ok_or(StoreError::NotFound)?;
        docs.remove(index);
        Ok(())
    }

    async fn exists(&self, collection: &str, filter: &Filter) -> StoreResult<bool> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection)
            .is_some_and(|docs| docs.iter().any(|d| filter.matches(d))))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::to_document;

    #[tokio::test]
    async fn insert_assigns_id_and_find_sorts() {
        let store = MemoryStore::new();
        for n in [3, 1, 2] {
            store
                .insert("players", to_document(&json!({"player_number": n, "auction_id": "a1"})).unwrap())
                .await
                .unwrap();
        }
        store
            .insert("players", to_document(&json!({"player_number": 9, "auction_id": "a2"})).unwrap())
            .await
            .unwrap();

        let found = store
            .find("players", &Filter::eq("auction_id", "a1"), Some(&Sort::asc("player_number")))
            .await
            .unwrap();
        let numbers: Vec<_> = found.iter().map(|d| d["player_number"].clone()).collect();
        assert_eq!(numbers, vec![json!(1), json!(2), json!(3)]);
        assert!(found.iter().all(|d| d["id"].is_string()));
    }

    #[tokio::test]
    async fn insert_unique_rejects_matching_documents() {
        let store = MemoryStore::new();
        let unless = Filter::eq("email", "a@x.com");
        let user = to_document(&json!({"email": "a@x.com"})).unwrap();

        store.insert_unique("users", user.clone(), &unless).await.unwrap();
        let err = store.insert_unique("users", user, &unless).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict));
        assert_eq!(store.len("users").await, 1);
    }

    #[tokio::test]
    async fn update_and_delete_report_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_one("auctions", &Filter::eq("id", "nope"), Update::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        let id = store
            .insert("auctions", to_document(&json!({"auction_name": "A"})).unwrap())
            .await
            .unwrap();
        let updated = store
            .update_one(
                "auctions",
                &Filter::eq("id", id.as_str()),
                Update::set(to_document(&json!({"auction_name": "B"})).unwrap()),
            )
            .await
            .unwrap();
        assert_eq!(updated["auction_name"], json!("B"));

        store.delete_one("auctions", &Filter::eq("id", id.as_str())).await.unwrap();
        assert!(!store.exists("auctions", &Filter::All).await.unwrap());
        assert!(matches!(
            store.delete_one("auctions", &Filter::eq("id", id.as_str())).await,
            Err(StoreError::NotFound)
        ));
    }
}
