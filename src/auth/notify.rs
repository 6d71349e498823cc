use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use super::otp::OtpFlow;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("mail relay request failed: {0}")]
    Relay(#[from] reqwest::Error),
    #[error("mail relay rejected message with status {0}")]
    Rejected(u16),
}

/// 验证码的带外投递，调用方不等待结果
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, flow: OtpFlow, code: u32) -> Result<(), NotifyError>;
}

/// 未配置邮件中继时使用，只记录日志
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, flow: OtpFlow, code: u32) -> Result<(), NotifyError> {
        tracing::info!(to, subject = flow.subject(), "no mail relay configured, otp not delivered");
        tracing::debug!(to, code, "otp for local delivery");
        Ok(())
    }
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    subject: &'a str,
    code: u32,
}

/// 通过 HTTP 邮件中继发送验证码
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMailer {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn send(&self, to: &str, flow: OtpFlow, code: u32) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RelayMessage {
                to,
                subject: flow.subject(),
                code,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}
