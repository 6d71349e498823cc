//! 无密码认证：OTP 两阶段协议与会话令牌

pub mod notify;
pub mod otp;
pub mod token;

pub use notify::{HttpMailer, LogNotifier, Notifier, NotifyError};
pub use otp::{CodeGenerator, IdentityRecord, OsRngCodes, OtpEngine, OtpFlow, OtpRecord, USERS};
pub use token::{SessionClaims, SessionToken, TokenSigner};
