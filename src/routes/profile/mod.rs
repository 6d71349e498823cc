mod handler;
mod model;

pub use handler::{get_profile, upsert_profile};
pub use model::{PROFILES, Profile, ProfileRequest, UserProfile};
