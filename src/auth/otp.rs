//! OTP 会话引擎
//!
//! 状态：未申请 → 已发码 → (已验证 | 已过期)。同一邮箱同一流程只保留最新一条记录，
//! 重新申请会覆盖旧码。注册与登录使用不同的键前缀，可以同时存在。
//!
//! 验证码不匹配时记录保留，用户可以在 TTL 内重试，没有次数上限。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::{Rng, rngs::OsRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::notify::{LogNotifier, Notifier};
use super::token::{SessionToken, TokenSigner};
use crate::cache::{CacheResult, VolatileStore};
use crate::error::AppError;
use crate::store::{DurableStore, Filter, from_document, to_document};
use crate::utils::{normalize_email, within};

/// 用户身份集合
pub const USERS: &str = "users";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpFlow {
    Register,
    Login,
}

impl OtpFlow {
    pub fn key(&self, email: &str) -> String {
        match self {
            OtpFlow::Register => format!("register_otp:{email}"),
            OtpFlow::Login => format!("login_otp:{email}"),
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            OtpFlow::Register => "Registration OTP",
            OtpFlow::Login => "Login OTP",
        }
    }
}

/// 暂存在易失存储中的验证码记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpRecord {
    pub code: u32,
    pub email: String,
    /// 登录流程在发码时就已知用户ID
    #[serde(default)]
    pub identity_id: Option<String>,
    /// 注册时提交的手机号，验证通过后写入身份记录
    #[serde(default)]
    pub mobile: Option<String>,
    pub issued_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub trait CodeGenerator: Send + Sync {
    /// 六位数字验证码
    fn next_code(&self) -> u32;
}

/// 操作系统随机源
pub struct OsRngCodes;

impl CodeGenerator for OsRngCodes {
    fn next_code(&self) -> u32 {
        OsRng.gen_range(100_000..=999_999)
    }
}

#[derive(Clone)]
pub struct OtpEngine {
    cache: Arc<dyn VolatileStore>,
    store: Arc<dyn DurableStore>,
    signer: TokenSigner,
    notifier: Arc<dyn Notifier>,
    codes: Arc<dyn CodeGenerator>,
    ttl: Duration,
    deadline: Duration,
}

impl OtpEngine {
    pub fn new(
        cache: Arc<dyn VolatileStore>,
        store: Arc<dyn DurableStore>,
        signer: TokenSigner,
        ttl: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            signer,
            notifier: Arc::new(LogNotifier),
            codes: Arc::new(OsRngCodes),
            ttl,
            deadline,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    /// 申请验证码
    ///
    /// 注册要求邮箱尚未注册，登录要求邮箱已注册。新码覆盖旧码，投递在后台进行，
    /// 投递失败不会撤销已发出的验证码。
    pub async fn request_code(
        &self,
        flow: OtpFlow,
        email: &str,
        mobile: Option<&str>,
    ) -> Result<(), AppError> {
        let email = normalize_email(email)?;
        let existing = self.find_identity(&email).await?;

        let (identity_id, mobile) = match (flow, existing) {
            (OtpFlow::Register, Some(_)) => {
                warn!(email = %email, "user already exists");
                return Err(AppError::Conflict("account already exists"));
            }
            (OtpFlow::Register, None) => {
                let mobile = mobile
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .ok_or_else(|| AppError::Validation("mobile is required".into()))?;
                (None, Some(mobile.to_string()))
            }
            (OtpFlow::Login, None) => return Err(AppError::NotFound("user")),
            (OtpFlow::Login, Some(identity)) => (Some(identity.id), None),
        };

        let code = self.codes.next_code();
        let record = OtpRecord {
            code,
            email: email.clone(),
            identity_id,
            mobile,
            issued_at: Utc::now().timestamp(),
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| AppError::Internal(format!("failed to encode otp record: {e}")))?;

        self.volatile("otp.stage", self.cache.set(&flow.key(&email), &json, self.ttl))
            .await?;
        info!(email = %email, ?flow, "otp issued");

        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&email, flow, code).await {
                warn!(email = %email, ?flow, error = %e, "failed to deliver otp");
            }
        });

        Ok(())
    }

    /// 校验验证码并签发会话令牌
    ///
    /// 只有记录仍是读到的那一条时才能删除占用，删掉记录的请求才能继续；
    /// 注册流程随后才写入身份记录，写入失败时把记录放回去以便重试。
    /// 中途崩溃最多丢失这一次验证码，不会产生重复身份。
    pub async fn verify_code(
        &self,
        flow: OtpFlow,
        email: &str,
        submitted: u32,
    ) -> Result<SessionToken, AppError> {
        let email = normalize_email(email)?;
        let key = flow.key(&email);

        let raw = self
            .volatile("otp.read", self.cache.get(&key))
            .await?
            .ok_or(AppError::NotFound("otp"))?;

        let record: OtpRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(email = %email, error = %e, "discarding undecodable otp record");
                if let Err(e) = self.volatile("otp.discard", self.cache.delete(&[key])).await {
                    warn!(email = %email, error = %e, "failed to discard undecodable otp record");
                }
                return Err(AppError::NotFound("otp"));
            }
        };

        if record.code != submitted {
            warn!(email = %email, ?flow, "otp mismatch");
            return Err(AppError::Unauthorized("invalid otp"));
        }

        let claimed = self
            .volatile("otp.claim", self.cache.take_if_equal(&key, &raw))
            .await?;
        if !claimed {
            // 记录已被并发请求用掉，或已被新验证码覆盖
            return Err(AppError::NotFound("otp"));
        }

        let identity_id = match flow {
            OtpFlow::Login => record
                .identity_id
                .clone()
                .ok_or(AppError::NotFound("otp"))?,
            OtpFlow::Register => match self.persist_identity(&record).await {
                Ok(id) => id,
                Err(e) => {
                    if matches!(e, AppError::Upstream(_) | AppError::Timeout(_)) {
                        self.restage(&key, &record, &raw).await;
                    }
                    return Err(e);
                }
            },
        };

        let token = self.signer.issue(&identity_id, &email)?;
        info!(email = %email, ?flow, "otp verified, session issued");
        Ok(token)
    }

    pub async fn find_identity(&self, email: &str) -> Result<Option<IdentityRecord>, AppError> {
        let docs = within(
            self.deadline,
            "users.find",
            self.store.find(USERS, &Filter::eq("email", email), None),
        )
        .await?;

        match docs.into_iter().next() {
            Some(doc) => Ok(Some(from_document(doc)?)),
            None => Ok(None),
        }
    }

    async fn persist_identity(&self, record: &OtpRecord) -> Result<String, AppError> {
        let now = Utc::now();
        let doc = to_document(&json!({
            "email": record.email,
            "mobile": record.mobile.clone().unwrap_or_default(),
            "image": null,
            "created_at": now,
            "updated_at": now,
        }))?;
        let id = within(
            self.deadline,
            "users.insert",
            self.store
                .insert_unique(USERS, doc, &Filter::eq("email", record.email.as_str())),
        )
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => AppError::Conflict("account already exists"),
            other => other,
        })?;
        info!(email = %record.email, id = %id, "identity created");
        Ok(id)
    }

    /// 按剩余有效期把记录放回去，已过期或已有新验证码就不再放回
    async fn restage(&self, key: &str, record: &OtpRecord, raw: &str) {
        let elapsed = (Utc::now().timestamp() - record.issued_at).max(0) as u64;
        let Some(remaining) = self.ttl.as_secs().checked_sub(elapsed).filter(|s| *s > 0) else {
            return;
        };
        match self
            .volatile(
                "otp.restage",
                self.cache.set_if_absent(key, raw, Duration::from_secs(remaining)),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => info!(key, "newer otp already staged, skipping restage"),
            Err(e) => warn!(key, error = %e, "failed to restage otp after persist failure"),
        }
    }

    async fn volatile<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = CacheResult<T>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(op, error = %e, "otp store call failed");
                Err(AppError::Upstream(e.to_string()))
            }
            Err(_) => {
                tracing::error!(op, "otp store call timed out");
                Err(AppError::Timeout(op))
            }
        }
    }
}
