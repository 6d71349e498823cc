use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    #[serde(default)]
    pub mobile: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    /// 兼容数字与字符串两种提交方式
    pub otp: serde_json::Value,
}

impl VerifyOtpRequest {
    pub fn code(&self) -> Result<u32, AppError> {
        let parsed = match &self.otp {
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            serde_json::Value::String(s) => s.trim().parse::<u32>().ok(),
            _ => None,
        };
        parsed
            .filter(|code| (100_000..=999_999).contains(code))
            .ok_or_else(|| AppError::Validation("otp must be a six digit number".into()))
    }
}

#[derive(Debug, Serialize)]
pub struct OtpSentResponse {
    pub message: &'static str,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(otp: serde_json::Value) -> VerifyOtpRequest {
        VerifyOtpRequest {
            email: "a@x.com".into(),
            otp,
        }
    }

    #[test]
    fn otp_accepts_numbers_and_numeric_strings() {
        assert_eq!(request(json!(482913)).code().unwrap(), 482913);
        assert_eq!(request(json!(" 482913 ")).code().unwrap(), 482913);
    }

    #[test]
    fn otp_rejects_other_shapes() {
        for otp in [json!(12), json!("abc"), json!(null), json!(1_000_000), json!(-5)] {
            assert!(request(otp).code().is_err());
        }
    }
}
