use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    AppState,
    auth::{IdentityRecord, SessionClaims, USERS},
    cache::{CacheKey, CacheRead, Cacheable},
    error::AppError,
    store::{Document, Filter, Update, from_document, to_document},
    utils::within,
};

pub const PROFILES: &str = "profiles";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub batting_hand: String,
    #[serde(default)]
    pub batting_order: String,
    #[serde(default)]
    pub batting_style: String,
    #[serde(default)]
    pub bowling_arm: String,
    #[serde(default)]
    pub bowling_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProfileRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub batting_hand: String,
    #[serde(default)]
    pub batting_order: String,
    #[serde(default)]
    pub batting_style: String,
    #[serde(default)]
    pub bowling_arm: String,
    #[serde(default)]
    pub bowling_type: String,
}

/// 用户与资料合并后的视图，对应 `profile:{email}` 缓存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub mobile: String,
    pub first_name: String,
    pub last_name: String,
    pub image_url: String,
    pub role: String,
    pub batting_hand: String,
    pub batting_order: String,
    pub batting_style: String,
    pub bowling_arm: String,
    pub bowling_type: String,
    pub updated_at: DateTime<Utc>,
}

impl Cacheable for UserProfile {}

impl UserProfile {
    fn merge(user: IdentityRecord, profile: Profile) -> Self {
        UserProfile {
            id: user.id,
            email: user.email,
            mobile: user.mobile,
            first_name: profile.first_name,
            last_name: profile.last_name,
            image_url: profile.image_url,
            role: profile.role,
            batting_hand: profile.batting_hand,
            batting_order: profile.batting_order,
            batting_style: profile.batting_style,
            bowling_arm: profile.bowling_arm,
            bowling_type: profile.bowling_type,
            updated_at: profile.updated_at,
        }
    }

    pub async fn fetch(state: &AppState, claims: &SessionClaims) -> Result<CacheRead<UserProfile>, AppError> {
        let key = CacheKey::profile(&claims.email);
        let deadline = state.config.store_timeout();

        state
            .cache
            .read_through(&key, state.config.profile_cache_ttl(), || async {
                let user: IdentityRecord = first(
                    within(
                        deadline,
                        "users.find",
                        state.store.find(USERS, &Filter::eq("email", claims.email.as_str()), None),
                    )
                    .await?,
                    "user",
                )?;
                let profile: Profile = first(
                    within(
                        deadline,
                        "profiles.find",
                        state.store.find(PROFILES, &Filter::eq("user_id", user.id.as_str()), None),
                    )
                    .await?,
                    "profile",
                )?;
                Ok::<_, AppError>(UserProfile::merge(user, profile))
            })
            .await
    }
}

fn first<T: serde::de::DeserializeOwned>(
    docs: Vec<Document>,
    what: &'static str,
) -> Result<T, AppError> {
    match docs.into_iter().next() {
        Some(doc) => Ok(from_document(doc)?),
        None => Err(AppError::NotFound(what)),
    }
}

impl Profile {
    /// 按用户ID更新，没有则插入
    pub async fn upsert(
        state: &AppState,
        claims: &SessionClaims,
        req: ProfileRequest,
    ) -> Result<Profile, AppError> {
        let deadline = state.config.store_timeout();
        let now = Utc::now();
        let filter = Filter::eq("user_id", claims.sub.as_str());
        let mut fields = to_document(&req)?;
        fields.insert("updated_at".into(), json!(now));

        let doc = match within(
            deadline,
            "profiles.update",
            state.store.update_one(PROFILES, &filter, Update::set(fields.clone())),
        )
        .await
        {
            Ok(doc) => doc,
            Err(AppError::NotFound(_)) => {
                fields.insert("user_id".into(), json!(claims.sub));
                fields.insert("created_at".into(), json!(now));
                let id = within(
                    deadline,
                    "profiles.insert",
                    state.store.insert(PROFILES, fields.clone()),
                )
                .await?;
                fields.insert("id".into(), json!(id));
                fields
            }
            Err(e) => return Err(e),
        };
        let profile: Profile = from_document(doc)?;

        state.cache.invalidate(&[CacheKey::profile(&claims.email)]).await;
        tracing::info!(user_id = %claims.sub, "profile saved");
        Ok(profile)
    }
}
