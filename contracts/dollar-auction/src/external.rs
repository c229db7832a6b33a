use commons::{ContractTokenAmount, PriceSource};
use concordium_std::*;

use crate::state::{AuctionStage, TopBid};

/// Registration of a single asset accepted for bidding and prize funding.
#[derive(Debug, Clone, Serialize, SchemaType)]
pub struct TokenListing {
    /// CIS-2 contract holding the asset.
    pub token: ContractAddress,
    /// How the asset's USD value is resolved.
    pub source: PriceSource,
}

#[derive(Debug, Clone, Serialize, SchemaType)]
pub struct InitParams {
    /// Price oracle contract queried for feed-priced assets.
    pub oracle: ContractAddress,
    /// Accepted assets. The set is fixed for the lifetime of the contract.
    pub tokens: Vec<TokenListing>,
}

/// Initial prize pool amounts, parallel to the asset registration order.
#[derive(Debug, Clone, Serialize, SchemaType)]
pub struct FundingParams {
    pub amounts: Vec<ContractTokenAmount>,
}

#[derive(Debug, Clone, Serialize, SchemaType)]
pub struct BidParams {
    /// Asset the bid is denominated in.
    pub token: ContractAddress,
    pub amount: ContractTokenAmount,
}

#[derive(Debug, Clone, Serialize, SchemaType)]
pub struct ExtensionParams {
    /// Asset the contribution is denominated in.
    pub token: ContractAddress,
    pub amount: ContractTokenAmount,
}

/// Snapshot of the auction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, SchemaType)]
pub struct AuctionView {
    /// Stage at the queried slot time.
    pub stage: AuctionStage,
    pub end: Timestamp,
    pub top_bid: Option<TopBid>,
    pub total_points: u64,
    pub winner_claimed: bool,
    pub oracle: ContractAddress,
}

/// Registry entry with its pool and bid bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, SchemaType)]
pub struct TokenView {
    pub token: ContractAddress,
    pub source: PriceSource,
    pub prize_pool: ContractTokenAmount,
    pub total_bids: ContractTokenAmount,
}
