use commons::{
    ContractTokenAmount, UsdValue, BID_TAG, EXTEND_TAG, INIT_TAG, POINTS_CLAIM_TAG,
    PRIZE_CLAIM_TAG, SETTLE_TAG,
};
use concordium_std::*;

/// Auction opening event data.
#[derive(Debug, Serial)]
pub struct InitEvent {
    /// Auction deadline.
    pub end: Timestamp,
}

/// Bid event data.
#[derive(Debug, Serial)]
pub struct BidEvent<'a> {
    /// Bidder account address.
    pub bidder: &'a AccountAddress,
    /// Asset the bid is denominated in.
    pub token: &'a ContractAddress,
    /// Bid amount in native token units.
    pub amount: ContractTokenAmount,
    /// USD value of the bid.
    pub value: UsdValue,
}

/// Pool funding and deadline extension event data.
#[derive(Debug, Serial)]
pub struct ExtendEvent<'a> {
    /// Funder account address.
    pub funder: &'a AccountAddress,
    /// Asset the contribution is denominated in.
    pub token: &'a ContractAddress,
    /// Contribution amount in native token units.
    pub amount: ContractTokenAmount,
    /// New auction deadline.
    pub end: Timestamp,
}

/// Settlement event data.
#[derive(Debug, Serial)]
pub struct SettleEvent {
    /// Auction winner, if any bid was placed.
    pub winner: Option<AccountAddress>,
    /// Frozen consolation denominator.
    pub total_points: u64,
}

/// Winner prize claim event data.
#[derive(Debug, Serial)]
pub struct PrizeClaimEvent<'a> {
    /// Auction winner.
    pub winner: &'a AccountAddress,
}

/// Points claim event data.
#[derive(Debug, Serial)]
pub struct PointsClaimEvent<'a> {
    /// Claimant account address.
    pub account: &'a AccountAddress,
    /// Points consumed by the claim.
    pub points: u64,
}

/// Tagged Custom event to be serialized for the event log.
#[derive(Debug)]
pub enum AuctionEvents<'a> {
    Init(InitEvent),
    Bid(BidEvent<'a>),
    Extend(ExtendEvent<'a>),
    Settle(SettleEvent),
    PrizeClaim(PrizeClaimEvent<'a>),
    PointsClaim(PointsClaimEvent<'a>),
}

impl<'a> AuctionEvents<'a> {
    pub fn init(end: Timestamp) -> Self {
        Self::Init(InitEvent { end })
    }

    pub fn bid(
        bidder: &'a AccountAddress,
        token: &'a ContractAddress,
        amount: ContractTokenAmount,
        value: UsdValue,
    ) -> Self {
        Self::Bid(BidEvent {
            bidder,
            token,
            amount,
            value,
        })
    }

    pub fn extend(
        funder: &'a AccountAddress,
        token: &'a ContractAddress,
        amount: ContractTokenAmount,
        end: Timestamp,
    ) -> Self {
        Self::Extend(ExtendEvent {
            funder,
            token,
            amount,
            end,
        })
    }

    pub fn settle(winner: Option<AccountAddress>, total_points: u64) -> Self {
        Self::Settle(SettleEvent {
            winner,
            total_points,
        })
    }

    pub fn prize_claim(winner: &'a AccountAddress) -> Self {
        Self::PrizeClaim(PrizeClaimEvent { winner })
    }

    pub fn points_claim(account: &'a AccountAddress, points: u64) -> Self {
        Self::PointsClaim(PointsClaimEvent { account, points })
    }
}

impl<'a> Serial for AuctionEvents<'a> {
    fn serial<W: Write>(&self, out: &mut W) -> Result<(), W::Err> {
        match self {
            AuctionEvents::Init(event) => {
                out.write_u8(INIT_TAG)?;
                event.serial(out)
            }
            AuctionEvents::Bid(event) => {
                out.write_u8(BID_TAG)?;
                event.serial(out)
            }
            AuctionEvents::Extend(event) => {
                out.write_u8(EXTEND_TAG)?;
                event.serial(out)
            }
            AuctionEvents::Settle(event) => {
                out.write_u8(SETTLE_TAG)?;
                event.serial(out)
            }
            AuctionEvents::PrizeClaim(event) => {
                out.write_u8(PRIZE_CLAIM_TAG)?;
                event.serial(out)
            }
            AuctionEvents::PointsClaim(event) => {
                out.write_u8(POINTS_CLAIM_TAG)?;
                event.serial(out)
            }
        }
    }
}
