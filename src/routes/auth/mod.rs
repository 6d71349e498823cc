mod handler;
mod model;

pub use handler::{login, login_otp, register, register_otp};
pub use model::{LoginRequest, OtpSentResponse, RegisterRequest, VerifyOtpRequest};
