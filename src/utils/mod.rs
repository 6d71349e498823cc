use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::store::StoreError;

/// 在截止时间内执行一次持久化存储调用，超时返回 `AppError::Timeout`
pub async fn within<T, F>(deadline: Duration, op: &'static str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(|e| {
            if !matches!(e, StoreError::NotFound | StoreError::Conflict) {
                tracing::error!(op, error = %e, "durable store call failed");
            }
            AppError::from(e)
        }),
        Err(_) => {
            tracing::error!(op, ?deadline, "durable store call timed out");
            Err(AppError::Timeout(op))
        }
    }
}

/// 规范化并校验邮箱，只做形状检查
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(|c| c.is_whitespace() || matches!(c, '*' | '?' | '[' | ']'))
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(AppError::Validation(format!("invalid email: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_lowercases_and_trims() {
        assert_eq!(normalize_email("  A@X.com ").unwrap(), "a@x.com");
    }

    #[test]
    fn normalize_email_rejects_bad_shapes() {
        for raw in ["", "a", "@x.com", "a@x", "a@.com", "a@x.", "a b@x.com", "a*@x.com"] {
            assert!(normalize_email(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[tokio::test]
    async fn within_maps_elapsed_deadline_to_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, StoreError>(())
        };
        let err = within(Duration::from_millis(10), "test.slow", slow).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout("test.slow")));
    }

    #[tokio::test]
    async fn within_passes_not_found_through() {
        let missing = async { Err::<(), _>(StoreError::NotFound) };
        let err = within(Duration::from_secs(1), "test.missing", missing).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
