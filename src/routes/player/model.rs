use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    AppState,
    cache::{CacheKey, CacheRead},
    error::AppError,
    routes::auction::Auction,
    store::{Filter, Sort, Update, from_document, to_document},
    utils::within,
};

pub const PLAYERS: &str = "players";

/// 新入库球员的初始状态
pub const HAMMER_UPCOMING: &str = "upcoming";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub auction_id: String,
    pub player_number: i64,
    pub player_name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub prev_team: String,
    #[serde(default)]
    pub current_team: String,
    pub hammer: String,
    #[serde(default)]
    pub base_price: f64,
    #[serde(default)]
    pub selling_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipl_team: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewPlayer {
    pub player_number: i64,
    pub player_name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub prev_team: String,
    #[serde(default)]
    pub base_price: f64,
    #[serde(default)]
    pub ipl_team: Option<String>,
}

/// 只写入提交了的字段
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PlayerUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_team: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hammer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selling_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipl_team: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SavedPlayers {
    pub players: usize,
}

impl NewPlayer {
    fn validate(&self) -> Result<(), AppError> {
        if self.player_name.trim().is_empty() {
            return Err(AppError::Validation("player_name is required".into()));
        }
        if self.player_number < 0 || self.base_price < 0.0 {
            return Err(AppError::Validation(format!(
                "player {} has a negative number or price",
                self.player_name
            )));
        }
        Ok(())
    }
}

impl Player {
    pub async fn list(state: &AppState, auction_id: &str) -> Result<CacheRead<Vec<Player>>, AppError> {
        let key = CacheKey::players(auction_id);
        let deadline = state.config.store_timeout();
        let filter = Filter::eq("auction_id", auction_id);

        state
            .cache
            .read_through(&key, state.config.player_cache_ttl(), || async {
                let docs = within(
                    deadline,
                    "players.find",
                    state.store.find(PLAYERS, &filter, Some(&Sort::asc("player_number"))),
                )
                .await?;
                docs.into_iter()
                    .map(|doc| from_document(doc).map_err(AppError::from))
                    .collect::<Result<Vec<Player>, AppError>>()
            })
            .await
    }

    /// 批量保存，整批先校验；中途写入失败时已写入的部分保留，缓存照常失效
    pub async fn save_batch(
        state: &AppState,
        auction_id: &str,
        email: &str,
        players: Vec<NewPlayer>,
    ) -> Result<usize, AppError> {
        if players.is_empty() {
            return Err(AppError::Validation("no players submitted".into()));
        }
        for player in &players {
            player.validate()?;
        }
        owned_auction(state, auction_id, email).await?;

        let deadline = state.config.store_timeout();
        let mut saved = 0;
        let mut outcome = Ok(());
        for player in players {
            let now = Utc::now();
            let doc = to_document(&json!({
                "auction_id": auction_id,
                "player_number": player.player_number,
                "player_name": player.player_name.trim(),
                "country": player.country,
                "role": player.role,
                "prev_team": player.prev_team,
                "current_team": "",
                "hammer": HAMMER_UPCOMING,
                "base_price": player.base_price,
                "selling_price": 0.0,
                "ipl_team": player.ipl_team,
                "created_at": now,
                "updated_at": now,
            }))?;
            match within(deadline, "players.insert", state.store.insert(PLAYERS, doc)).await {
                Ok(_) => saved += 1,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        if saved > 0 {
            state.cache.invalidate_matching(&CacheKey::players_pattern(auction_id)).await;
        }
        outcome?;
        tracing::info!(auction_id, saved = saved as u64, "players saved");
        Ok(saved)
    }

    pub async fn update(
        state: &AppState,
        id: &str,
        email: &str,
        patch: PlayerUpdate,
    ) -> Result<Player, AppError> {
        let mut set = to_document(&patch)?;
        if set.is_empty() {
            return Err(AppError::Validation("nothing to update".into()));
        }
        if patch.selling_price.is_some_and(|p| p < 0.0) || patch.base_price.is_some_and(|p| p < 0.0) {
            return Err(AppError::Validation("price must not be negative".into()));
        }
        set.insert("updated_at".into(), json!(Utc::now()));

        let current = Self::find_by_id(state, id).await?;
        owned_auction(state, &current.auction_id, email).await?;

        let doc = within(
            state.config.store_timeout(),
            "players.update",
            state.store.update_one(PLAYERS, &Filter::eq("id", id), Update::set(set)),
        )
        .await
        .map_err(not_found_as_player)?;
        let player: Player = from_document(doc)?;

        state
            .cache
            .invalidate_matching(&CacheKey::players_pattern(&player.auction_id))
            .await;
        tracing::info!(player_id = %player.id, auction_id = %player.auction_id, "player updated");
        Ok(player)
    }

    pub async fn delete(state: &AppState, id: &str, email: &str) -> Result<(), AppError> {
        let current = Self::find_by_id(state, id).await?;
        owned_auction(state, &current.auction_id, email).await?;

        within(
            state.config.store_timeout(),
            "players.delete",
            state.store.delete_one(PLAYERS, &Filter::eq("id", id)),
        )
        .await
        .map_err(not_found_as_player)?;

        state
            .cache
            .invalidate_matching(&CacheKey::players_pattern(&current.auction_id))
            .await;
        tracing::info!(player_id = id, auction_id = %current.auction_id, "player deleted");
        Ok(())
    }

    pub async fn find_by_id(state: &AppState, id: &str) -> Result<Player, AppError> {
        let docs = within(
            state.config.store_timeout(),
            "players.find_by_id",
            state.store.find(PLAYERS, &Filter::eq("id", id), None),
        )
        .await?;
        match docs.into_iter().next() {
            Some(doc) => Ok(from_document(doc)?),
            None => Err(AppError::NotFound("player")),
        }
    }
}

/// 球员只能由拍卖创建者维护，其他人看到的是不存在
async fn owned_auction(state: &AppState, auction_id: &str, email: &str) -> Result<Auction, AppError> {
    let auction = Auction::find_by_id(state, auction_id).await?;
    if auction.created_by != email {
        return Err(AppError::NotFound("auction"));
    }
    Ok(auction)
}

fn not_found_as_player(err: AppError) -> AppError {
    match err {
        AppError::NotFound(_) => AppError::NotFound("player"),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    #[test]
    fn update_only_carries_submitted_fields() {
        let patch = PlayerUpdate {
            hammer: Some("sold".into()),
            selling_price: Some(120.0),
            ..Default::default()
        };
        let doc = to_document(&patch).unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc["hammer"], Value::from("sold"));
    }

    #[test]
    fn new_player_requires_a_name() {
        let player = NewPlayer {
            player_number: 1,
            player_name: "  ".into(),
            country: String::new(),
            role: String::new(),
            prev_team: String::new(),
            base_price: 20.0,
            ipl_team: None,
        };
        assert!(matches!(player.validate(), Err(AppError::Validation(_))));
    }
}
