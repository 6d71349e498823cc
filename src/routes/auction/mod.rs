mod handler;
mod model;

pub use handler::{create_auction, get_auction, join_auction, list_auctions, update_auction};
pub use model::{AUCTIONS, Auction, AuctionDetail, AuctionMember, AuctionRequest, JoinedAuctionUser, ListQuery};
