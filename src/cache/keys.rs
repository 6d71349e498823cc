use std::fmt;
use std::str::FromStr;

/// 缓存键：`领域:范围:标识`
///
/// 相同查询总是得到相同的键，不同用户的查询键互不相交。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

/// 拍卖列表的查询范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuctionScope {
    All,
    Created,
    Joined,
}

impl AuctionScope {
    pub const EVERY: [AuctionScope; 3] = [AuctionScope::Created, AuctionScope::Joined, AuctionScope::All];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionScope::All => "all",
            AuctionScope::Created => "create",
            AuctionScope::Joined => "join",
        }
    }
}

impl FromStr for AuctionScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(AuctionScope::All),
            "create" => Ok(AuctionScope::Created),
            "join" => Ok(AuctionScope::Joined),
            other => Err(format!("unknown auction scope: {other}")),
        }
    }
}

impl CacheKey {
    pub fn auctions(scope: AuctionScope, email: &str) -> Self {
        CacheKey(format!("auctions:{}:{}", scope.as_str(), email))
    }

    /// 某用户所有范围的拍卖列表键，写入拍卖后需要一起失效
    pub fn auctions_every_scope(email: &str) -> Vec<CacheKey> {
        AuctionScope::EVERY
            .iter()
            .map(|scope| CacheKey::auctions(*scope, email))
            .collect()
    }

    pub fn players(auction_id: &str) -> Self {
        CacheKey(format!("players:auction:{auction_id}"))
    }

    /// 拍卖下所有球员缓存的匹配模式，包括将来可能按条件细分的键
    pub fn players_pattern(auction_id: &str) -> String {
        format!("players:auction:{auction_id}*")
    }

    pub fn profile(email: &str) -> Self {
        CacheKey(format!("profile:{email}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
