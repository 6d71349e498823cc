mod handler;
mod model;

pub use handler::{delete_player, list_players, save_players, update_player};
pub use model::{NewPlayer, PLAYERS, Player, PlayerUpdate, SavedPlayers};
