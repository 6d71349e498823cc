use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::AppError;

/// 会话令牌中的声明
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String, // 用户ID
    pub id: String,
    pub email: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: i64,
}

/// 对称密钥签发与校验，算法固定为 HS256
///
/// 校验时只接受固定的那一个算法，头部声明其它算法（包括 `none`、RS256）的令牌一律拒绝。
#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.jwt_secret.as_bytes(), config.jwt_expiration())
    }

    pub fn issue(&self, identity_id: &str, email: &str) -> Result<SessionToken, AppError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: identity_id.to_string(),
            id: identity_id.to_string(),
            email: email.to_string(),
            iat: now,
            nbf: now,
            exp: now + self.ttl.as_secs() as i64,
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("failed to sign session token: {e}")))?;

        Ok(SessionToken {
            token,
            expires_at: claims.exp,
        })
    }

    pub fn verify(&self, raw: Option<&str>) -> Result<SessionClaims, AppError> {
        let token = raw
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized("missing token"))?;

        let mut validation = Validation::new(self.algorithm);
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);

        decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "session token rejected");
                AppError::Unauthorized("invalid token")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    fn signer() -> TokenSigner {
        TokenSigner::new(SECRET, Duration::from_secs(3600))
    }

    fn sign_with(alg: Algorithm, claims: &SessionClaims) -> String {
        encode(&Header::new(alg), claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn claims_at(iat: i64, nbf: i64, exp: i64) -> SessionClaims {
        SessionClaims {
            sub: "u-1".into(),
            id: "u-1".into(),
            email: "a@x.com".into(),
            iat,
            nbf,
            exp,
        }
    }

    #[test]
    fn issued_token_verifies_with_identity_claims() {
        let signer = signer();
        let issued = signer.issue("u-1", "a@x.com").unwrap();
        assert!(!issued.token.is_empty());

        let claims = signer.verify(Some(&issued.token)).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.exp, issued.expires_at);
        assert!(claims.nbf <= claims.exp);
    }

    #[test]
    fn missing_or_blank_token_is_unauthorized() {
        assert!(matches!(signer().verify(None), Err(AppError::Unauthorized(_))));
        assert!(matches!(signer().verify(Some("  ")), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn expired_and_not_yet_valid_tokens_are_rejected() {
        let now = Utc::now().timestamp();
        let expired = sign_with(Algorithm::HS256, &claims_at(now - 7200, now - 7200, now - 3600));
        let future = sign_with(Algorithm::HS256, &claims_at(now, now + 3600, now + 7200));

        assert!(matches!(signer().verify(Some(&expired)), Err(AppError::Unauthorized(_))));
        assert!(matches!(signer().verify(Some(&future)), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let other = TokenSigner::new(b"another-secret", Duration::from_secs(3600));
        let token = other.issue("u-1", "a@x.com").unwrap().token;
        assert!(signer().verify(Some(&token)).is_err());
    }

    #[test]
    fn other_algorithms_are_rejected() {
        let now = Utc::now().timestamp();
        let claims = claims_at(now, now, now + 3600);

        // 同为 HMAC 也不接受
        let hs512 = sign_with(Algorithm::HS512, &claims);
        assert!(signer().verify(Some(&hs512)).is_err());

        // 把合法令牌的头部换成 RS256 / none
        let valid = signer().issue("u-1", "a@x.com").unwrap().token;
        let (_, rest) = valid.split_once('.').unwrap();
        let rs256 = format!("eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.{rest}");
        assert!(signer().verify(Some(&rs256)).is_err());

        let (payload, _) = rest.split_once('.').unwrap();
        let none = format!("eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.{payload}.");
        assert!(signer().verify(Some(&none)).is_err());
    }
}
