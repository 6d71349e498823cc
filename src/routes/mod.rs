pub mod auction;
pub mod auth;
pub mod player;
pub mod profile;
