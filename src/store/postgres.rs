use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, types::Json};

use super::{Document, DurableStore, Filter, Sort, StoreError, StoreResult, Update};

const INIT_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        body JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (collection, id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_documents_body ON documents USING GIN (body jsonb_path_ops)",
    // 同一邮箱只能有一个用户
    "CREATE UNIQUE INDEX IF NOT EXISTS ux_users_email ON documents ((body->>'email')) WHERE collection = 'users'",
];

/// 基于 Postgres JSONB 的文档存储
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 启动时建表，可重复执行
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in INIT_SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// 把过滤条件编译成 SQL 谓词，所有取值都走参数绑定
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::All => {
            qb.push("TRUE");
        }
        Filter::Eq(field, value) => {
            qb.push("(body -> ")
                .push_bind(field.clone())
                .push(" = ")
                .push_bind(Json(value.clone()))
                .push(")");
        }
        Filter::Contains(pattern) => {
            qb.push("(body @> ").push_bind(Json(pattern.clone())).push(")");
        }
        Filter::Any(filters) => push_group(qb, filters, " OR ", "FALSE"),
        Filter::Every(filters) => push_group(qb, filters, " AND ", "TRUE"),
    }
}

fn push_group(
    qb: &mut QueryBuilder<'_, Postgres>,
    filters: &[Filter],
    joiner: &str,
    empty: &str,
) {
    if filters.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (i, f) in filters.iter().enumerate() {
        if i > 0 {
            qb.push(joiner);
        }
        push_filter(qb, f);
    }
    qb.push(")");
}

/// 定位第一个命中文档的主键子查询
fn push_first_match(qb: &mut QueryBuilder<'_, Postgres>, collection: &str, filter: &Filter) {
    qb.push("(collection, id) = (SELECT collection, id FROM documents WHERE collection = ")
        .push_bind(collection.to_string())
        .push(" AND ");
    push_filter(qb, filter);
    qb.push(" LIMIT 1)");
}

fn body_of(row: &sqlx::postgres::PgRow) -> StoreResult<Document> {
    let Json(body): Json<Value> = row.try_get("body")?;
    match body {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "document body is not an object: {other}"
        ))),
    }
}

#[async_trait]
impl DurableStore for PgStore {
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> StoreResult<Vec<Document>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT body FROM documents WHERE collection = ");
        qb.push_bind(collection.to_string()).push(" AND ");
        push_filter(&mut qb, filter);
        match sort {
            // 创建时间直接用列排序，JSON 里的时间戳字符串不能按字典序比较
            Some(sort) if sort.field == "created_at" => {
                qb.push(if sort.descending {
                    " ORDER BY created_at DESC"
                } else {
                    " ORDER BY created_at ASC"
                });
            }
            Some(sort) => {
                qb.push(" ORDER BY body -> ")
                    .push_bind(sort.field.clone())
                    .push(if sort.descending { " DESC NULLS LAST" } else { " ASC NULLS LAST" })
                    .push(", created_at ASC");
            }
            None => {
                qb.push(" ORDER BY created_at ASC");
            }
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(body_of).collect()
    }

    async fn insert(&self, collection: &str, mut doc: Document) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        doc.insert("id".into(), Value::String(id.clone()));

        sqlx::query("INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&id)
            .bind(Json(Value::Object(doc)))
            .execute(&self.pool)
            .await?;

        Ok(id)
    }

    async fn insert_unique(
        &self,
        collection: &str,
        mut doc: Document,
        unless: &Filter,
    ) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        doc.insert("id".into(), Value::String(id.clone()));

        // 并发插入由唯一索引兜底，违反约束时映射为 Conflict
        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO documents (collection, id, body) SELECT ");
        qb.push_bind(collection.to_string())
            .push(", ")
            .push_bind(id.clone())
            .push(", ")
            .push_bind(Json(Value::Object(doc)))
            .push(" WHERE NOT EXISTS (SELECT 1 FROM documents WHERE collection = ")
            .push_bind(collection.to_string())
            .push(" AND ");
        push_filter(&mut qb, unless);
        qb.push(")");

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: Update,
    ) -> StoreResult<Document> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE documents SET updated_at = now(), body = (");
        match &update.add_to_set {
            Some((field, value)) => {
                // 已包含则保持原样，否则追加到数组末尾
                qb.push("CASE WHEN COALESCE(body -> ")
                    .push_bind(field.clone())
                    .push(", '[]'::jsonb) @> jsonb_build_array(")
                    .push_bind(Json(value.clone()))
                    .push("::jsonb) THEN body ELSE jsonb_set(body, ARRAY[")
                    .push_bind(field.clone())
                    .push("]::text[], COALESCE(body -> ")
                    .push_bind(field.clone())
                    .push(", '[]'::jsonb) || jsonb_build_array(")
                    .push_bind(Json(value.clone()))
                    .push("::jsonb)) END");
            }
            None => {
                qb.push("body");
            }
        }
        qb.push(") || ")
            .push_bind(Json(Value::Object(update.set)))
            .push(" WHERE ");
        push_first_match(&mut qb, collection, filter);
        qb.push(" RETURNING body");

        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        body_of(&row)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> StoreResult<()> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM documents WHERE ");
        push_first_match(&mut qb, collection, filter);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn exists(&self, collection: &str, filter: &Filter) -> StoreResult<bool> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT EXISTS (SELECT 1 FROM documents WHERE collection = ",
        );
        qb.push_bind(collection.to_string()).push(" AND ");
        push_filter(&mut qb, filter);
        qb.push(") AS found");

        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.try_get::<bool, _>("found")?)
    }
}
