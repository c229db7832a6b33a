use commons::{
    covers_share, usd_value, ContractReadError, ContractTokenAmount, CustomContractError,
    FeedStatus, HostPriceFeedExt, HostTokenExt, PriceSource, UsdValue,
};
use concordium_std::*;

use crate::events::AuctionEvents;
use crate::external::*;
use crate::state::State;
use crate::POOL_SHARE_DIVISOR;

/// Fix the asset registry and the price oracle. The auction stays
/// uninitialized until the prize pool is funded through `init`.
#[init(contract = "DollarAuction", parameter = "InitParams")]
fn contract_init<S: HasStateApi>(
    ctx: &impl HasInitContext,
    state_builder: &mut StateBuilder<S>,
) -> InitResult<State<S>> {
    let params = InitParams::deserial(&mut ctx.parameter_cursor())?;
    let state = State::new(state_builder, params.oracle, params.tokens)?;
    Ok(state)
}

/// Fund the initial prize pool and open the auction for seven days.
///
/// Callable exactly once. `amounts` is parallel to the asset registration
/// order and every amount is pulled from the caller, who must have made
/// this contract an operator on the asset contracts.
///
/// It rejects if:
/// - The auction was already initialized.
/// - The amount list does not match the registered assets.
/// - Any of the transfers fails.
#[receive(
    mutable,
    contract = "DollarAuction",
    name = "init",
    parameter = "FundingParams",
    enable_logger
)]
fn contract_open<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ReceiveResult<()> {
    let params = FundingParams::deserial(&mut ctx.parameter_cursor())?;

    let funder = if let Address::Account(funder) = ctx.sender() {
        funder
    } else {
        bail!(CustomContractError::OnlyAccountAddress.into());
    };

    let now = ctx.metadata().slot_time();
    host.state_mut().open(&params.amounts, now)?;

    let self_address = ctx.self_address();
    let order = host.state().token_order.clone();
    for (token, amount) in order.iter().zip(params.amounts.iter()) {
        if amount.0 == 0 {
            continue;
        }
        host.token_transfer_in(token, funder, self_address, *amount)
            .map_err(handle_transfer_error)?;
    }

    logger.log(&AuctionEvents::init(host.state().end))?;

    Ok(())
}

/// Place a bid denominated in any approved asset.
///
/// The bid's USD value must beat the current top bid by at least one
/// dollar; the very first bid must be worth at least one dollar. The
/// amount is pulled from the bidder, who earns one point regardless of
/// the bid size.
///
/// It rejects if:
/// - The auction is not open or the deadline has passed.
/// - The asset is not approved.
/// - The asset's price feed has no confirmed, undisputed observation.
/// - The bid value is too low.
/// - The transfer fails.
#[receive(
    mutable,
    contract = "DollarAuction",
    name = "bid",
    parameter = "BidParams",
    enable_logger
)]
fn contract_bid<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ReceiveResult<()> {
    let params = BidParams::deserial(&mut ctx.parameter_cursor())?;

    let bidder = if let Address::Account(bidder) = ctx.sender() {
        bidder
    } else {
        bail!(CustomContractError::OnlyAccountAddress.into());
    };

    let now = ctx.metadata().slot_time();
    host.state().ensure_open(now)?;

    let source = host
        .state()
        .tokens
        .get(&params.token)
        .map(|info| info.source)
        .ok_or(CustomContractError::TokenNotApproved)?;
    let value = token_usd_value(host, &source, params.amount)?;

    host.state_mut()
        .place_bid(bidder, params.token, params.amount, value)?;

    host.token_transfer_in(&params.token, bidder, ctx.self_address(), params.amount)
        .map_err(handle_transfer_error)?;

    logger.log(&AuctionEvents::bid(
        &bidder,
        &params.token,
        params.amount,
        value,
    ))?;

    Ok(())
}

/// Grow the prize pool and reset the deadline to ten days from now.
///
/// The contribution must be worth at least a tenth of the whole pool,
/// valued across all assets at call time. There is no bound on the number
/// of extensions.
///
/// It rejects if:
/// - The auction is not open or the deadline has passed.
/// - The asset is not approved.
/// - A price needed for the valuation is unavailable.
/// - The contribution is worth less than the required pool share.
/// - The transfer fails.
#[receive(
    mutable,
    contract = "DollarAuction",
    name = "fundWithExtension",
    parameter = "ExtensionParams",
    enable_logger
)]
fn contract_fund_with_extension<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ReceiveResult<()> {
    let params = ExtensionParams::deserial(&mut ctx.parameter_cursor())?;

    let funder = if let Address::Account(funder) = ctx.sender() {
        funder
    } else {
        bail!(CustomContractError::OnlyAccountAddress.into());
    };

    let now = ctx.metadata().slot_time();
    host.state().ensure_open(now)?;

    let source = host
        .state()
        .tokens
        .get(&params.token)
        .map(|info| info.source)
        .ok_or(CustomContractError::TokenNotApproved)?;
    let value = token_usd_value(host, &source, params.amount)?;

    // The pool is valued afresh on every call; a stored total would go
    // stale as prices move.
    let pool_total = pool_usd_value(host)?;
    ensure!(
        params.amount.0 > 0 && covers_share(value, pool_total, POOL_SHARE_DIVISOR),
        CustomContractError::InsufficientExtension.into()
    );

    host.state_mut().fund(&params.token, params.amount, now)?;

    host.token_transfer_in(&params.token, funder, ctx.self_address(), params.amount)
        .map_err(handle_transfer_error)?;

    logger.log(&AuctionEvents::extend(
        &funder,
        &params.token,
        params.amount,
        host.state().end,
    ))?;

    Ok(())
}

/// Settle the auction once the deadline has passed.
///
/// Fixes the winner, freezes the consolation denominator and removes the
/// winner's points from it.
#[receive(mutable, contract = "DollarAuction", name = "settle", enable_logger)]
fn contract_settle<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ReceiveResult<()> {
    let now = ctx.metadata().slot_time();
    let winner = host.state_mut().settle(now)?;

    logger.log(&AuctionEvents::settle(winner, host.state().total_points))?;

    Ok(())
}

/// Withdraw the whole prize pool as the auction winner.
///
/// A repeated claim is a no-op: it must neither fail nor pay again.
#[receive(
    mutable,
    contract = "DollarAuction",
    name = "claimWinnerPrize",
    enable_logger
)]
fn contract_claim_winner_prize<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ReceiveResult<()> {
    let caller = if let Address::Account(caller) = ctx.sender() {
        caller
    } else {
        bail!(CustomContractError::OnlyAccountAddress.into());
    };

    let payouts = host.state_mut().claim_prize(caller)?;

    if let Some(payouts) = payouts {
        let self_address = ctx.self_address();
        for (token, amount) in payouts {
            host.token_transfer_out(&token, self_address, caller, amount)
                .map_err(handle_transfer_error)?;
        }
        logger.log(&AuctionEvents::prize_claim(&caller))?;
    }

    Ok(())
}

/// Withdraw the consolation share of all collected bids, proportional to
/// the caller's points against the denominator frozen at settlement.
///
/// Shares are rounded down per asset; the dust stays in custody.
#[receive(
    mutable,
    contract = "DollarAuction",
    name = "claimPoints",
    enable_logger
)]
fn contract_claim_points<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &mut impl HasHost<State<S>, StateApiType = S>,
    logger: &mut impl HasLogger,
) -> ReceiveResult<()> {
    let caller = if let Address::Account(caller) = ctx.sender() {
        caller
    } else {
        bail!(CustomContractError::OnlyAccountAddress.into());
    };

    let (points, payouts) = host.state_mut().claim_points(caller)?;

    let self_address = ctx.self_address();
    for (token, amount) in payouts {
        host.token_transfer_out(&token, self_address, caller, amount)
            .map_err(handle_transfer_error)?;
    }

    logger.log(&AuctionEvents::points_claim(&caller, points))?;

    Ok(())
}

/// CIS-2 receive hook. Deposits are accounted by the entrypoint that
/// initiated the transfer; the hook only has to accept it.
#[receive(contract = "DollarAuction", name = "onReceivingCIS2")]
fn contract_on_cis2_received<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    _host: &impl HasHost<State<S>, StateApiType = S>,
) -> ReceiveResult<()> {
    ensure!(
        matches!(ctx.sender(), Address::Contract(_)),
        CustomContractError::ContractOnly.into()
    );
    Ok(())
}

/// Snapshot of the auction state at the queried slot time.
#[receive(contract = "DollarAuction", name = "view", return_value = "AuctionView")]
fn contract_view<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &impl HasHost<State<S>, StateApiType = S>,
) -> ReceiveResult<AuctionView> {
    let state = host.state();
    Ok(AuctionView {
        stage: state.stage(ctx.metadata().slot_time()),
        end: state.end,
        top_bid: state.top_bid,
        total_points: state.total_points,
        winner_claimed: state.winner_claimed,
        oracle: state.oracle,
    })
}

/// Registered assets with their pool and bid totals, in registration order.
#[receive(
    contract = "DollarAuction",
    name = "viewTokens",
    return_value = "Vec<TokenView>"
)]
fn contract_view_tokens<S: HasStateApi>(
    _ctx: &impl HasReceiveContext,
    host: &impl HasHost<State<S>, StateApiType = S>,
) -> ReceiveResult<Vec<TokenView>> {
    let state = host.state();
    let mut tokens = Vec::with_capacity(state.token_order.len());
    for token in state.token_order.iter() {
        let info = state
            .tokens
            .get(token)
            .ok_or(CustomContractError::UnknownToken)?;
        tokens.push(TokenView {
            token: *token,
            source: info.source,
            prize_pool: info.prize_pool,
            total_bids: info.total_bids,
        });
    }
    Ok(tokens)
}

/// Live points of an account.
#[receive(
    contract = "DollarAuction",
    name = "viewPoints",
    parameter = "AccountAddress",
    return_value = "u64"
)]
fn contract_view_points<S: HasStateApi>(
    ctx: &impl HasReceiveContext,
    host: &impl HasHost<State<S>, StateApiType = S>,
) -> ReceiveResult<u64> {
    let address = AccountAddress::deserial(&mut ctx.parameter_cursor())?;
    Ok(host.state().points_of(&address))
}

// Resolve the USD value of a token amount through the asset's price source.
fn token_usd_value<S: HasStateApi>(
    host: &impl HasHost<State<S>, StateApiType = S>,
    source: &PriceSource,
    amount: ContractTokenAmount,
) -> ReceiveResult<UsdValue> {
    let rate = match source {
        PriceSource::Pegged(rate) => *rate,
        PriceSource::Feed(feed) => {
            match host
                .feed_status(&host.state().oracle, feed)
                .map_err(handle_read_error)?
            {
                FeedStatus::Confirmed(observation) => observation.rate,
                FeedStatus::Unavailable | FeedStatus::Disputed => {
                    bail!(CustomContractError::PriceUnavailable.into())
                }
            }
        }
    };

    let value = usd_value(rate, amount).ok_or(CustomContractError::AmountOverflow)?;
    Ok(value)
}

// Value the whole prize pool across the fixed asset list. Empty balances
// contribute nothing and skip the price lookup.
fn pool_usd_value<S: HasStateApi>(
    host: &impl HasHost<State<S>, StateApiType = S>,
) -> ReceiveResult<UsdValue> {
    let mut total = UsdValue::zero();
    for token in host.state().token_order.iter() {
        let info = host
            .state()
            .tokens
            .get(token)
            .ok_or(CustomContractError::UnknownToken)?;
        if info.prize_pool.0 == 0 {
            continue;
        }
        let value = token_usd_value(host, &info.source, info.prize_pool)?;
        total = total
            .checked_add(value)
            .ok_or(CustomContractError::AmountOverflow)?;
    }
    Ok(total)
}

// Custody failures abort the whole call so bookkeeping stays in sync with
// actual holdings.
fn handle_transfer_error<R>(_error: CallContractError<R>) -> Reject {
    CustomContractError::InvokeTransferError.into()
}

fn handle_read_error<R>(error: ContractReadError<R>) -> Reject {
    match error {
        ContractReadError::Call(_) => CustomContractError::InvokeContractError.into(),
        ContractReadError::Compatibility => CustomContractError::Incompatible.into(),
        ContractReadError::Parse => CustomContractError::InvokeContractError.into(),
    }
}

#[concordium_cfg_test]
mod tests {
    use super::*;
    use crate::state::{AuctionStage, TopBid};
    use commons::test::{parse_and_check_mock, parse_and_ok_mock, reject_mock};
    use commons::{FeedId, FeedRate, GetFeedRateParams, GetFeedRateResult, TransferParameter, UsdRate};
    use concordium_cis2::Receiver;
    use concordium_std::test_infrastructure::*;
    use core::fmt::Debug;

    const ADMIN: AccountAddress = AccountAddress([0u8; 32]);
    const BIDDER_1: AccountAddress = AccountAddress([1u8; 32]);
    const BIDDER_2: AccountAddress = AccountAddress([2u8; 32]);

    const ORACLE: ContractAddress = ContractAddress {
        index: 1,
        subindex: 0,
    };
    const SELF_ADDRESS: ContractAddress = ContractAddress {
        index: 10,
        subindex: 0,
    };
    // pegged to one dollar, never consults the oracle
    const TOKEN_A: ContractAddress = ContractAddress {
        index: 21,
        subindex: 0,
    };
    const TOKEN_B: ContractAddress = ContractAddress {
        index: 22,
        subindex: 0,
    };
    const TOKEN_C: ContractAddress = ContractAddress {
        index: 23,
        subindex: 0,
    };
    const UNKNOWN_TOKEN: ContractAddress = ContractAddress {
        index: 24,
        subindex: 0,
    };

    const FEED_B: FeedId = FeedId([0xb0; 32]);
    const FEED_C: FeedId = FeedId([0xc0; 32]);

    const HOUR_MILLIS: u64 = 1000 * 60 * 60;
    const DAY_MILLIS: u64 = 24 * HOUR_MILLIS;
    /// Deadline after opening the auction at slot time zero.
    const INITIAL_END: u64 = 7 * DAY_MILLIS;

    const POOL_A: u64 = 100;
    const POOL_B: u64 = 10;
    const POOL_C: u64 = 20;

    fn listings() -> Vec<TokenListing> {
        vec![
            TokenListing {
                token: TOKEN_A,
                source: PriceSource::Pegged(UsdRate::from_dollars_per_unit(1)),
            },
            TokenListing {
                token: TOKEN_B,
                source: PriceSource::Feed(FEED_B),
            },
            TokenListing {
                token: TOKEN_C,
                source: PriceSource::Feed(FEED_C),
            },
        ]
    }

    fn new_host() -> TestHost<State<TestStateApi>> {
        let params = InitParams {
            oracle: ORACLE,
            tokens: listings(),
        };
        let bytes = to_bytes(&params);
        let mut ctx = TestInitContext::empty();
        ctx.set_init_origin(ADMIN).set_parameter(&bytes);
        let mut state_builder = TestStateBuilder::new();

        let state =
            contract_init(&ctx, &mut state_builder).expect_report("Failed during init_DollarAuction");

        TestHost::new(state, state_builder)
    }

    fn mock_transfers_ok(host: &mut TestHost<State<TestStateApi>>) {
        for token in [TOKEN_A, TOKEN_B, TOKEN_C] {
            host.setup_mock_entrypoint(
                token,
                OwnedEntrypointName::new_unchecked("transfer".into()),
                parse_and_ok_mock::<TransferParameter, _>(()),
            );
        }
    }

    fn confirmed(dollars_per_unit: u64) -> FeedStatus {
        FeedStatus::Confirmed(FeedRate {
            rate: UsdRate::from_dollars_per_unit(dollars_per_unit),
            observed_at: Timestamp::from_timestamp_millis(0),
        })
    }

    fn mock_rates(host: &mut TestHost<State<TestStateApi>>, rate_b: FeedStatus, rate_c: FeedStatus) {
        host.setup_mock_entrypoint(
            ORACLE,
            OwnedEntrypointName::new_unchecked("latestRate".into()),
            MockFn::new(move |parameter, _amount, _balance, _state: &mut State<TestStateApi>| {
                let params = GetFeedRateParams::deserial(&mut Cursor::new(parameter))
                    .map_err(|_| CallContractError::Trap)?;
                let result = if params.feed == FEED_B {
                    rate_b
                } else if params.feed == FEED_C {
                    rate_c
                } else {
                    FeedStatus::Unavailable
                };
                Ok((false, Some(GetFeedRateResult { result })))
            }),
        );
    }

    /// A mock that only accepts a single payout of `amount` to `to`.
    fn expect_transfer_mock(to: AccountAddress, amount: u64) -> MockFn<State<TestStateApi>> {
        parse_and_check_mock::<TransferParameter, _>(
            move |transfers| {
                transfers.0.len() == 1
                    && transfers.0[0].amount == ContractTokenAmount::from(amount)
                    && matches!(transfers.0[0].to, Receiver::Account(account) if account == to)
            },
            (),
        )
    }

    /// A mock that only accepts a single pull of `amount` from `from` into
    /// this contract.
    fn expect_pull_mock(from: AccountAddress, amount: u64) -> MockFn<State<TestStateApi>> {
        parse_and_check_mock::<TransferParameter, _>(
            move |transfers| {
                transfers.0.len() == 1
                    && transfers.0[0].amount == ContractTokenAmount::from(amount)
                    && transfers.0[0].from == Address::Account(from)
                    && matches!(&transfers.0[0].to, Receiver::Contract(address, _) if *address == SELF_ADDRESS)
            },
            (),
        )
    }

    fn open_auction(host: &mut TestHost<State<TestStateApi>>, slot_millis: u64) {
        call_open(
            host,
            ADMIN,
            vec![POOL_A, POOL_B, POOL_C],
            slot_millis,
        )
        .expect_report("Failed to open the auction");
    }

    fn call_open(
        host: &mut TestHost<State<TestStateApi>>,
        sender: AccountAddress,
        amounts: Vec<u64>,
        slot_millis: u64,
    ) -> ReceiveResult<()> {
        let params = FundingParams {
            amounts: amounts.into_iter().map(ContractTokenAmount::from).collect(),
        };
        let bytes = to_bytes(&params);
        let mut ctx = TestReceiveContext::empty();
        ctx.set_sender(Address::Account(sender))
            .set_self_address(SELF_ADDRESS)
            .set_metadata_slot_time(Timestamp::from_timestamp_millis(slot_millis))
            .set_parameter(&bytes);
        let mut logger = LogRecorder::init();
        contract_open(&ctx, host, &mut logger)
    }

    fn call_bid(
        host: &mut TestHost<State<TestStateApi>>,
        sender: AccountAddress,
        token: ContractAddress,
        amount: u64,
        slot_millis: u64,
    ) -> ReceiveResult<()> {
        let params = BidParams {
            token,
            amount: ContractTokenAmount::from(amount),
        };
        let bytes = to_bytes(&params);
        let mut ctx = TestReceiveContext::empty();
        ctx.set_sender(Address::Account(sender))
            .set_self_address(SELF_ADDRESS)
            .set_metadata_slot_time(Timestamp::from_timestamp_millis(slot_millis))
            .set_parameter(&bytes);
        let mut logger = LogRecorder::init();
        contract_bid(&ctx, host, &mut logger)
    }

    fn call_fund(
        host: &mut TestHost<State<TestStateApi>>,
        sender: AccountAddress,
        token: ContractAddress,
        amount: u64,
        slot_millis: u64,
    ) -> ReceiveResult<()> {
        let params = ExtensionParams {
            token,
            amount: ContractTokenAmount::from(amount),
        };
        let bytes = to_bytes(&params);
        let mut ctx = TestReceiveContext::empty();
        ctx.set_sender(Address::Account(sender))
            .set_self_address(SELF_ADDRESS)
            .set_metadata_slot_time(Timestamp::from_timestamp_millis(slot_millis))
            .set_parameter(&bytes);
        let mut logger = LogRecorder::init();
        contract_fund_with_extension(&ctx, host, &mut logger)
    }

    fn call_settle(
        host: &mut TestHost<State<TestStateApi>>,
        slot_millis: u64,
    ) -> ReceiveResult<()> {
        let mut ctx = TestReceiveContext::empty();
        ctx.set_sender(Address::Account(ADMIN))
            .set_self_address(SELF_ADDRESS)
            .set_metadata_slot_time(Timestamp::from_timestamp_millis(slot_millis));
        let mut logger = LogRecorder::init();
        contract_settle(&ctx, host, &mut logger)
    }

    fn call_claim_prize(
        host: &mut TestHost<State<TestStateApi>>,
        sender: AccountAddress,
    ) -> ReceiveResult<()> {
        let mut ctx = TestReceiveContext::empty();
        ctx.set_sender(Address::Account(sender))
            .set_self_address(SELF_ADDRESS)
            .set_metadata_slot_time(Timestamp::from_timestamp_millis(INITIAL_END));
        let mut logger = LogRecorder::init();
        contract_claim_winner_prize(&ctx, host, &mut logger)
    }

    fn call_claim_points(
        host: &mut TestHost<State<TestStateApi>>,
        sender: AccountAddress,
    ) -> ReceiveResult<()> {
        let mut ctx = TestReceiveContext::empty();
        ctx.set_sender(Address::Account(sender))
            .set_self_address(SELF_ADDRESS)
            .set_metadata_slot_time(Timestamp::from_timestamp_millis(INITIAL_END));
        let mut logger = LogRecorder::init();
        contract_claim_points(&ctx, host, &mut logger)
    }

    fn expect_error<T: Debug>(expr: ReceiveResult<T>, err: CustomContractError, msg: &str) {
        let actual = expr.expect_err_report(msg);
        claim_eq!(actual, err.into());
    }

    #[concordium_test]
    fn test_constructor() {
        let host = new_host();

        claim_eq!(host.state().oracle, ORACLE);
        claim_eq!(host.state().token_order, vec![TOKEN_A, TOKEN_B, TOKEN_C]);
        claim_eq!(
            host.state().tokens.get(&TOKEN_B).expect_report("missing token").source,
            PriceSource::Feed(FEED_B)
        );
        claim_eq!(host.state().top_bid, None);
        claim!(!host.state().winner_claimed);
    }

    #[concordium_test]
    fn test_constructor_rejects_duplicates() {
        let mut tokens = listings();
        tokens.push(TokenListing {
            token: TOKEN_A,
            source: PriceSource::Feed(FEED_B),
        });
        let params = InitParams {
            oracle: ORACLE,
            tokens,
        };
        let bytes = to_bytes(&params);
        let mut ctx = TestInitContext::empty();
        ctx.set_init_origin(ADMIN).set_parameter(&bytes);
        let mut state_builder = TestStateBuilder::new();

        match contract_init(&ctx, &mut state_builder) {
            Ok(_) => fail!("Duplicate registration must be rejected"),
            Err(err) => claim_eq!(err, CustomContractError::DuplicateToken.into()),
        }
    }

    #[concordium_test]
    fn test_open() {
        let mut host = new_host();
        mock_transfers_ok(&mut host);

        // funding is only possible after initialization
        expect_error(
            call_bid(&mut host, BIDDER_1, TOKEN_A, 2, 0),
            CustomContractError::NotInitialized,
            "Bidding must fail before initialization",
        );

        expect_error(
            call_open(&mut host, ADMIN, vec![POOL_A, POOL_B], 0),
            CustomContractError::InvalidFields,
            "Opening must fail with a short amount list",
        );

        open_auction(&mut host, 0);
        claim_eq!(
            host.state().end,
            Timestamp::from_timestamp_millis(INITIAL_END),
            "Auction must initially run for seven days"
        );
        claim_eq!(
            host.state().tokens.get(&TOKEN_A).expect_report("missing token").prize_pool,
            ContractTokenAmount::from(POOL_A)
        );
        claim_eq!(
            host.state().tokens.get(&TOKEN_C).expect_report("missing token").prize_pool,
            ContractTokenAmount::from(POOL_C)
        );

        expect_error(
            call_open(&mut host, ADMIN, vec![POOL_A, POOL_B, POOL_C], HOUR_MILLIS),
            CustomContractError::AlreadyInitialized,
            "Opening twice must fail",
        );
        // the failed attempt must not change any balance
        claim_eq!(
            host.state().tokens.get(&TOKEN_A).expect_report("missing token").prize_pool,
            ContractTokenAmount::from(POOL_A)
        );
    }

    #[concordium_test]
    fn test_open_pulls_initial_funding() {
        let mut host = new_host();
        host.setup_mock_entrypoint(
            TOKEN_A,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            expect_pull_mock(ADMIN, POOL_A),
        );
        host.setup_mock_entrypoint(
            TOKEN_B,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            expect_pull_mock(ADMIN, POOL_B),
        );
        host.setup_mock_entrypoint(
            TOKEN_C,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            expect_pull_mock(ADMIN, POOL_C),
        );

        // the mocks trap on any transfer that is not the expected pull
        claim_eq!(call_open(&mut host, ADMIN, vec![POOL_A, POOL_B, POOL_C], 0), Ok(()));
    }

    #[concordium_test]
    fn test_bid_admission() {
        let mut host = new_host();
        mock_transfers_ok(&mut host);
        mock_rates(&mut host, confirmed(10), confirmed(2));
        open_auction(&mut host, 0);

        // ten dollars beats the absent top bid
        claim_eq!(call_bid(&mut host, BIDDER_1, TOKEN_B, 1, HOUR_MILLIS), Ok(()));
        claim_eq!(
            host.state().top_bid,
            Some(TopBid {
                bidder: BIDDER_1,
                value: UsdValue::from_dollars(10)
            })
        );
        claim_eq!(host.state().points_of(&BIDDER_1), 1);
        claim_eq!(host.state().total_points, 1);
        claim_eq!(
            host.state().tokens.get(&TOKEN_B).expect_report("missing token").total_bids,
            ContractTokenAmount::from(1)
        );

        expect_error(
            call_bid(&mut host, BIDDER_2, UNKNOWN_TOKEN, 100, HOUR_MILLIS),
            CustomContractError::TokenNotApproved,
            "Bidding an unregistered token must fail",
        );

        // nine dollars does not reach ten plus the dollar step
        expect_error(
            call_bid(&mut host, BIDDER_2, TOKEN_A, 9, HOUR_MILLIS),
            CustomContractError::BidTooLow,
            "Bidding below the step must fail",
        );

        // exactly top plus one dollar is enough, in a different token
        claim_eq!(call_bid(&mut host, BIDDER_2, TOKEN_A, 11, HOUR_MILLIS), Ok(()));
        claim_eq!(
            host.state().top_bid,
            Some(TopBid {
                bidder: BIDDER_2,
                value: UsdValue::from_dollars(11)
            })
        );
        claim_eq!(host.state().total_points, 2);

        // the deadline is exclusive
        expect_error(
            call_bid(&mut host, BIDDER_1, TOKEN_A, 50, INITIAL_END),
            CustomContractError::AuctionFinished,
            "Bidding at the deadline must fail",
        );
    }

    #[concordium_test]
    fn test_bid_rejects_contract_sender() {
        let mut host = new_host();
        mock_transfers_ok(&mut host);
        open_auction(&mut host, 0);

        let params = BidParams {
            token: TOKEN_A,
            amount: ContractTokenAmount::from(5),
        };
        let bytes = to_bytes(&params);
        let mut ctx = TestReceiveContext::empty();
        ctx.set_sender(Address::Contract(ORACLE))
            .set_self_address(SELF_ADDRESS)
            .set_metadata_slot_time(Timestamp::from_timestamp_millis(HOUR_MILLIS))
            .set_parameter(&bytes);
        let mut logger = LogRecorder::init();

        expect_error(
            contract_bid(&ctx, &mut host, &mut logger),
            CustomContractError::OnlyAccountAddress,
            "Contracts must not bid",
        );
    }

    #[concordium_test]
    fn test_bid_requires_confirmed_price() {
        let mut host = new_host();
        mock_transfers_ok(&mut host);
        open_auction(&mut host, 0);

        mock_rates(&mut host, FeedStatus::Unavailable, confirmed(2));
        expect_error(
            call_bid(&mut host, BIDDER_1, TOKEN_B, 1, HOUR_MILLIS),
            CustomContractError::PriceUnavailable,
            "A missing observation must not default to any value",
        );

        mock_rates(&mut host, FeedStatus::Disputed, confirmed(2));
        expect_error(
            call_bid(&mut host, BIDDER_1, TOKEN_B, 1, HOUR_MILLIS),
            CustomContractError::PriceUnavailable,
            "A disputed observation must not be used",
        );

        // the pegged token never consults the oracle
        claim_eq!(call_bid(&mut host, BIDDER_1, TOKEN_A, 2, HOUR_MILLIS), Ok(()));
    }

    #[concordium_test]
    fn test_bid_transfer_failure_aborts() {
        let mut host = new_host();
        mock_transfers_ok(&mut host);
        open_auction(&mut host, 0);

        host.setup_mock_entrypoint(
            TOKEN_A,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            reject_mock(),
        );
        expect_error(
            call_bid(&mut host, BIDDER_1, TOKEN_A, 2, HOUR_MILLIS),
            CustomContractError::InvokeTransferError,
            "A failed pull must abort the bid",
        );
    }

    #[concordium_test]
    fn test_fund_with_extension() {
        let mut host = new_host();
        mock_transfers_ok(&mut host);
        // pool value: 100 * $1 + 10 * $10 + 20 * $2 = $240, tenth is $24
        mock_rates(&mut host, confirmed(10), confirmed(2));
        open_auction(&mut host, 0);

        expect_error(
            call_fund(&mut host, BIDDER_1, UNKNOWN_TOKEN, 100, HOUR_MILLIS),
            CustomContractError::TokenNotApproved,
            "Funding with an unregistered token must fail",
        );
        expect_error(
            call_fund(&mut host, BIDDER_1, TOKEN_C, 0, HOUR_MILLIS),
            CustomContractError::InsufficientExtension,
            "Funding nothing must fail",
        );
        // eleven units at $2 are $22, just below the tenth
        expect_error(
            call_fund(&mut host, BIDDER_1, TOKEN_C, 11, HOUR_MILLIS),
            CustomContractError::InsufficientExtension,
            "Funding below a tenth of the pool must fail",
        );
        claim_eq!(
            host.state().end,
            Timestamp::from_timestamp_millis(INITIAL_END),
            "A failed funding must not move the deadline"
        );

        // twelve units at $2 are exactly a tenth
        claim_eq!(call_fund(&mut host, BIDDER_1, TOKEN_C, 12, HOUR_MILLIS), Ok(()));
        claim_eq!(
            host.state().end,
            Timestamp::from_timestamp_millis(HOUR_MILLIS + 10 * DAY_MILLIS),
            "Funding must reset the deadline to ten days from now"
        );
        claim_eq!(
            host.state().tokens.get(&TOKEN_C).expect_report("missing token").prize_pool,
            ContractTokenAmount::from(POOL_C + 12)
        );

        // funding does not award points
        claim_eq!(host.state().total_points, 0);
    }

    #[concordium_test]
    fn test_fund_requires_open_auction() {
        let mut host = new_host();
        mock_transfers_ok(&mut host);
        mock_rates(&mut host, confirmed(10), confirmed(2));
        open_auction(&mut host, 0);

        expect_error(
            call_fund(&mut host, BIDDER_1, TOKEN_A, 100, INITIAL_END),
            CustomContractError::AuctionFinished,
            "Funding past the deadline must not resurrect the auction",
        );
    }

    #[concordium_test]
    fn test_settle() {
        let mut host = new_host();
        mock_transfers_ok(&mut host);
        mock_rates(&mut host, confirmed(10), confirmed(2));
        open_auction(&mut host, 0);

        call_bid(&mut host, BIDDER_1, TOKEN_B, 1, HOUR_MILLIS).expect_report("bid failed");
        call_bid(&mut host, BIDDER_2, TOKEN_B, 2, 2 * HOUR_MILLIS).expect_report("bid failed");

        expect_error(
            call_settle(&mut host, INITIAL_END - 1),
            CustomContractError::AuctionStillActive,
            "Settling before the deadline must fail",
        );

        claim_eq!(call_settle(&mut host, INITIAL_END), Ok(()));
        claim_eq!(host.state().total_points, 1);
        claim_eq!(host.state().points_of(&BIDDER_2), 0);
        claim_eq!(host.state().points_of(&BIDDER_1), 1);

        expect_error(
            call_settle(&mut host, INITIAL_END),
            CustomContractError::AlreadySettled,
            "Settling twice must fail",
        );
    }

    #[concordium_test]
    fn test_settle_requires_initialization() {
        let mut host = new_host();
        expect_error(
            call_settle(&mut host, INITIAL_END),
            CustomContractError::NotInitialized,
            "Settling an uninitialized auction must fail",
        );
    }

    #[concordium_test]
    fn test_claim_winner_prize() {
        let mut host = new_host();
        mock_transfers_ok(&mut host);
        mock_rates(&mut host, confirmed(10), confirmed(2));
        open_auction(&mut host, 0);

        call_bid(&mut host, BIDDER_1, TOKEN_B, 1, HOUR_MILLIS).expect_report("bid failed");
        call_bid(&mut host, BIDDER_2, TOKEN_B, 2, 2 * HOUR_MILLIS).expect_report("bid failed");

        expect_error(
            call_claim_prize(&mut host, BIDDER_2),
            CustomContractError::NotSettled,
            "The prize is only claimable after settlement",
        );

        call_settle(&mut host, INITIAL_END).expect_report("settling failed");

        expect_error(
            call_claim_prize(&mut host, BIDDER_1),
            CustomContractError::NotWinner,
            "Only the winner may claim the prize",
        );

        // the claim must transfer exactly the recorded pool per asset
        host.setup_mock_entrypoint(
            TOKEN_A,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            expect_transfer_mock(BIDDER_2, POOL_A),
        );
        host.setup_mock_entrypoint(
            TOKEN_B,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            expect_transfer_mock(BIDDER_2, POOL_B),
        );
        host.setup_mock_entrypoint(
            TOKEN_C,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            expect_transfer_mock(BIDDER_2, POOL_C),
        );
        claim_eq!(call_claim_prize(&mut host, BIDDER_2), Ok(()));
        claim!(host.state().winner_claimed);

        // a repeated claim must succeed without touching custody
        for token in [TOKEN_A, TOKEN_B, TOKEN_C] {
            host.setup_mock_entrypoint(
                token,
                OwnedEntrypointName::new_unchecked("transfer".into()),
                reject_mock(),
            );
        }
        claim_eq!(call_claim_prize(&mut host, BIDDER_2), Ok(()));
    }

    #[concordium_test]
    fn test_claim_points() {
        let mut host = new_host();
        mock_transfers_ok(&mut host);
        mock_rates(&mut host, confirmed(10), confirmed(2));
        open_auction(&mut host, 0);

        // three units of bids collect in TOKEN_B, one point stays with the loser
        call_bid(&mut host, BIDDER_1, TOKEN_B, 1, HOUR_MILLIS).expect_report("bid failed");
        call_bid(&mut host, BIDDER_2, TOKEN_B, 2, 2 * HOUR_MILLIS).expect_report("bid failed");

        expect_error(
            call_claim_points(&mut host, BIDDER_1),
            CustomContractError::NotSettled,
            "Points are only claimable after settlement",
        );

        call_settle(&mut host, INITIAL_END).expect_report("settling failed");

        expect_error(
            call_claim_points(&mut host, BIDDER_2),
            CustomContractError::NoPoints,
            "The winner's points are gone at settlement",
        );

        // the sole remaining point earns all collected TOKEN_B bids
        host.setup_mock_entrypoint(
            TOKEN_B,
            OwnedEntrypointName::new_unchecked("transfer".into()),
            expect_transfer_mock(BIDDER_1, 3),
        );
        // no bids collected in the other tokens, so nothing may be paid there
        for token in [TOKEN_A, TOKEN_C] {
            host.setup_mock_entrypoint(
                token,
                OwnedEntrypointName::new_unchecked("transfer".into()),
                reject_mock(),
            );
        }
        claim_eq!(call_claim_points(&mut host, BIDDER_1), Ok(()));
        claim_eq!(host.state().points_of(&BIDDER_1), 0);

        expect_error(
            call_claim_points(&mut host, BIDDER_1),
            CustomContractError::NoPoints,
            "Claiming points twice must fail",
        );
    }

    #[concordium_test]
    fn test_on_receiving_cis2() {
        let mut host = new_host();

        let mut ctx = TestReceiveContext::empty();
        ctx.set_sender(Address::Contract(TOKEN_A))
            .set_self_address(SELF_ADDRESS)
            .set_metadata_slot_time(Timestamp::from_timestamp_millis(0));
        claim_eq!(contract_on_cis2_received(&ctx, &host), Ok(()));

        let mut ctx = TestReceiveContext::empty();
        ctx.set_sender(Address::Account(BIDDER_1))
            .set_self_address(SELF_ADDRESS)
            .set_metadata_slot_time(Timestamp::from_timestamp_millis(0));
        expect_error(
            contract_on_cis2_received(&ctx, &host),
            CustomContractError::ContractOnly,
            "The hook only accepts transfers from contracts",
        );
    }

    #[concordium_test]
    fn test_views() {
        let mut host = new_host();
        mock_transfers_ok(&mut host);
        mock_rates(&mut host, confirmed(10), confirmed(2));
        open_auction(&mut host, 0);
        call_bid(&mut host, BIDDER_1, TOKEN_B, 1, HOUR_MILLIS).expect_report("bid failed");

        let mut ctx = TestReceiveContext::empty();
        ctx.set_metadata_slot_time(Timestamp::from_timestamp_millis(2 * HOUR_MILLIS));
        let view = contract_view(&ctx, &host).expect_report("view failed");
        claim_eq!(
            view,
            AuctionView {
                stage: AuctionStage::Open,
                end: Timestamp::from_timestamp_millis(INITIAL_END),
                top_bid: Some(TopBid {
                    bidder: BIDDER_1,
                    value: UsdValue::from_dollars(10)
                }),
                total_points: 1,
                winner_claimed: false,
                oracle: ORACLE,
            }
        );

        let mut ctx = TestReceiveContext::empty();
        ctx.set_metadata_slot_time(Timestamp::from_timestamp_millis(INITIAL_END));
        let view = contract_view(&ctx, &host).expect_report("view failed");
        claim_eq!(view.stage, AuctionStage::Ended);

        let ctx = TestReceiveContext::empty();
        let tokens = contract_view_tokens(&ctx, &host).expect_report("view failed");
        claim_eq!(
            tokens,
            vec![
                TokenView {
                    token: TOKEN_A,
                    source: PriceSource::Pegged(UsdRate::from_dollars_per_unit(1)),
                    prize_pool: ContractTokenAmount::from(POOL_A),
                    total_bids: ContractTokenAmount::from(0),
                },
                TokenView {
                    token: TOKEN_B,
                    source: PriceSource::Feed(FEED_B),
                    prize_pool: ContractTokenAmount::from(POOL_B),
                    total_bids: ContractTokenAmount::from(1),
                },
                TokenView {
                    token: TOKEN_C,
                    source: PriceSource::Feed(FEED_C),
                    prize_pool: ContractTokenAmount::from(POOL_C),
                    total_bids: ContractTokenAmount::from(0),
                },
            ]
        );

        let bytes = to_bytes(&BIDDER_1);
        let mut ctx = TestReceiveContext::empty();
        ctx.set_parameter(&bytes);
        let points = contract_view_points(&ctx, &host).expect_report("view failed");
        claim_eq!(points, 1);
    }
}
