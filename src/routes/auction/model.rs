use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    AppState,
    auth::{IdentityRecord, USERS},
    cache::{AuctionScope, CacheKey, CacheRead},
    error::AppError,
    routes::profile::{PROFILES, Profile},
    store::{Document, Filter, Sort, Update, from_document, to_document},
    utils::within,
};

pub const AUCTIONS: &str = "auctions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedAuctionUser {
    pub email: String,
    #[serde(default)]
    pub is_team_owner: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub id: String,
    pub auction_name: String,
    #[serde(default)]
    pub auction_image: String,
    pub created_by: String,
    pub auction_date: DateTime<Utc>,
    #[serde(default)]
    pub is_ipl_auction: bool,
    #[serde(default)]
    pub joined_by: Vec<JoinedAuctionUser>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 拍卖详情，附带已加入成员的姓名
#[derive(Debug, Clone, Serialize)]
pub struct AuctionDetail {
    #[serde(flatten)]
    pub auction: Auction,
    pub user_names: Vec<AuctionMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuctionMember {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AuctionRequest {
    pub auction_name: String,
    #[serde(default)]
    pub auction_image: String,
    pub auction_date: DateTime<Utc>,
    #[serde(default)]
    pub is_ipl_auction: bool,
}

impl AuctionRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.auction_name.trim().is_empty() {
            return Err(AppError::Validation("auction_name is required".into()));
        }
        Ok(())
    }

    fn fields(&self, now: DateTime<Utc>) -> Result<Document, AppError> {
        Ok(to_document(&json!({
            "auction_name": self.auction_name.trim(),
            "auction_image": self.auction_image,
            "auction_date": self.auction_date,
            "is_ipl_auction": self.is_ipl_auction,
            "updated_at": now,
        }))?)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub scope: Option<String>,
}

impl ListQuery {
    pub fn scope(&self) -> Result<AuctionScope, AppError> {
        self.scope
            .as_deref()
            .unwrap_or("all")
            .parse()
            .map_err(AppError::Validation)
    }
}

fn joined_filter(email: &str) -> Filter {
    Filter::contains(json!({ "joined_by": [{ "email": email }] }))
}

fn scope_filter(scope: AuctionScope, email: &str) -> Filter {
    match scope {
        AuctionScope::Created => Filter::eq("created_by", email),
        AuctionScope::Joined => joined_filter(email),
        AuctionScope::All => Filter::any(vec![Filter::eq("created_by", email), joined_filter(email)]),
    }
}

impl Auction {
    pub fn has_joined(&self, email: &str) -> bool {
        self.joined_by.iter().any(|u| u.email == email)
    }

    /// 结果集可能包含本拍卖的所有列表键：创建者与每个参与者的全部范围
    pub fn dependent_keys(&self) -> Vec<CacheKey> {
        let emails: BTreeSet<&str> = std::iter::once(self.created_by.as_str())
            .chain(self.joined_by.iter().map(|u| u.email.as_str()))
            .collect();
        emails
            .into_iter()
            .flat_map(CacheKey::auctions_every_scope)
            .collect()
    }

    pub async fn list(
        state: &AppState,
        scope: AuctionScope,
        email: &str,
    ) -> Result<CacheRead<Vec<Auction>>, AppError> {
        let key = CacheKey::auctions(scope, email);
        let deadline = state.config.store_timeout();
        let filter = scope_filter(scope, email);

        state
            .cache
            .read_through(&key, state.config.auction_cache_ttl(), || async {
                let docs = within(
                    deadline,
                    "auctions.find",
                    state.store.find(AUCTIONS, &filter, Some(&Sort::desc("created_at"))),
                )
                .await?;
                docs.into_iter()
                    .map(|doc| from_document(doc).map_err(AppError::from))
                    .collect::<Result<Vec<Auction>, AppError>>()
            })
            .await
    }

    pub async fn create(state: &AppState, email: &str, req: AuctionRequest) -> Result<Auction, AppError> {
        req.validate()?;
        let now = Utc::now();
        let mut doc = req.fields(now)?;
        doc.insert("created_by".into(), json!(email));
        doc.insert("joined_by".into(), json!([]));
        doc.insert("created_at".into(), json!(now));

        let id = within(
            state.config.store_timeout(),
            "auctions.insert",
            state.store.insert(AUCTIONS, doc.clone()),
        )
        .await?;
        doc.insert("id".into(), json!(id));
        let auction: Auction = from_document(doc)?;

        // 新拍卖只会出现在创建者自己的列表里
        state.cache.invalidate(&CacheKey::auctions_every_scope(email)).await;
        tracing::info!(auction_id = %auction.id, created_by = email, "auction created");
        Ok(auction)
    }

    /// 只有创建者可以修改，否则按不存在处理
    pub async fn update(
        state: &AppState,
        id: &str,
        email: &str,
        req: AuctionRequest,
    ) -> Result<Auction, AppError> {
        req.validate()?;
        let filter = Filter::every(vec![Filter::eq("id", id), Filter::eq("created_by", email)]);

        let doc = within(
            state.config.store_timeout(),
            "auctions.update",
            state.store.update_one(AUCTIONS, &filter, Update::set(req.fields(Utc::now())?)),
        )
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound("auction"),
            other => other,
        })?;
        let auction: Auction = from_document(doc)?;

        state.cache.invalidate(&auction.dependent_keys()).await;
        tracing::info!(auction_id = %auction.id, "auction updated");
        Ok(auction)
    }

    pub async fn join(state: &AppState, id: &str, email: &str) -> Result<Auction, AppError> {
        let deadline = state.config.store_timeout();
        let current = Self::find_by_id(state, id).await?;
        if current.has_joined(email) {
            return Err(AppError::Conflict("already joined"));
        }

        let member = serde_json::to_value(JoinedAuctionUser {
            email: email.to_string(),
            is_team_owner: false,
        })
        .map_err(|e| AppError::Internal(e.to_string()))?;
        let update = Update::set(to_document(&json!({ "updated_at": Utc::now() }))?)
            .add_to_set("joined_by", member);

        let doc = within(
            deadline,
            "auctions.join",
            state.store.update_one(AUCTIONS, &Filter::eq("id", id), update),
        )
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound("auction"),
            other => other,
        })?;
        let auction: Auction = from_document(doc)?;

        let report = state.cache.invalidate(&auction.dependent_keys()).await;
        tracing::info!(
            auction_id = %auction.id,
            joined = email,
            removed = report.removed,
            "auction joined"
        );
        Ok(auction)
    }

    /// 按加入顺序列出成员姓名，还没有资料的成员不出现在列表里
    pub async fn detail(state: &AppState, id: &str) -> Result<AuctionDetail, AppError> {
        let auction = Self::find_by_id(state, id).await?;
        if auction.joined_by.is_empty() {
            return Ok(AuctionDetail {
                auction,
                user_names: Vec::new(),
            });
        }

        let deadline = state.config.store_timeout();
        let by_email = Filter::any(
            auction
                .joined_by
                .iter()
                .map(|u| Filter::eq("email", u.email.as_str()))
                .collect(),
        );
        let users = within(deadline, "users.find_members", state.store.find(USERS, &by_email, None))
            .await?
            .into_iter()
            .map(from_document::<IdentityRecord>)
            .collect::<Result<Vec<_>, _>>()?;
        if users.is_empty() {
            return Ok(AuctionDetail {
                auction,
                user_names: Vec::new(),
            });
        }

        let by_user = Filter::any(
            users
                .iter()
                .map(|u| Filter::eq("user_id", u.id.as_str()))
                .collect(),
        );
        let mut names: HashMap<String, String> = HashMap::new();
        for doc in within(
            deadline,
            "profiles.find_members",
            state.store.find(PROFILES, &by_user, None),
        )
        .await?
        {
            let profile: Profile = from_document(doc)?;
            let name = format!("{} {}", profile.first_name, profile.last_name);
            names.insert(profile.user_id, name.trim().to_string());
        }

        let ids: HashMap<&str, &str> = users
            .iter()
            .map(|u| (u.email.as_str(), u.id.as_str()))
            .collect();
        let user_names = auction
            .joined_by
            .iter()
            .filter_map(|member| {
                let user_id = ids.get(member.email.as_str())?;
                let name = names.get(*user_id)?;
                Some(AuctionMember {
                    email: member.email.clone(),
                    name: name.clone(),
                })
            })
            .collect();

        Ok(AuctionDetail { auction, user_names })
    }

    pub async fn find_by_id(state: &AppState, id: &str) -> Result<Auction, AppError> {
        let docs = within(
            state.config.store_timeout(),
            "auctions.find_by_id",
            state.store.find(AUCTIONS, &Filter::eq("id", id), None),
        )
        .await?;
        match docs.into_iter().next() {
            Some(doc) => Ok(from_document(doc)?),
            None => Err(AppError::NotFound("auction")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auction(created_by: &str, joined: &[&str]) -> Auction {
        let now = Utc::now();
        Auction {
            id: "a1".into(),
            auction_name: "IPL".into(),
            auction_image: String::new(),
            created_by: created_by.into(),
            auction_date: now,
            is_ipl_auction: true,
            joined_by: joined
                .iter()
                .map(|e| JoinedAuctionUser {
                    email: e.to_string(),
                    is_team_owner: false,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn dependent_keys_cover_creator_and_members() {
        let keys: Vec<String> = auction("o@x.com", &["a@x.com", "o@x.com"])
            .dependent_keys()
            .iter()
            .map(|k| k.to_string())
            .collect();

        assert_eq!(keys.len(), 6);
        for key in [
            "auctions:all:o@x.com",
            "auctions:create:o@x.com",
            "auctions:join:o@x.com",
            "auctions:all:a@x.com",
            "auctions:create:a@x.com",
            "auctions:join:a@x.com",
        ] {
            assert!(keys.iter().any(|k| k == key), "missing {key}");
        }
    }

    #[test]
    fn scope_filters_select_the_right_auctions() {
        let doc = to_document(&auction("o@x.com", &["a@x.com"])).unwrap();

        assert!(scope_filter(AuctionScope::Created, "o@x.com").matches(&doc));
        assert!(!scope_filter(AuctionScope::Created, "a@x.com").matches(&doc));
        assert!(scope_filter(AuctionScope::Joined, "a@x.com").matches(&doc));
        assert!(scope_filter(AuctionScope::All, "a@x.com").matches(&doc));
        assert!(scope_filter(AuctionScope::All, "o@x.com").matches(&doc));
        assert!(!scope_filter(AuctionScope::All, "z@x.com").matches(&doc));
    }

    #[test]
    fn unknown_list_type_is_rejected() {
        let query = ListQuery { scope: Some("mine".into()) };
        assert!(matches!(query.scope(), Err(AppError::Validation(_))));
        assert_eq!(ListQuery { scope: None }.scope().unwrap(), AuctionScope::All);
    }
}
