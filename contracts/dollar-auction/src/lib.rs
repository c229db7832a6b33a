//! A multi-token escalation auction.
//!
//! # Description
//! A prize pool denominated in several CIS-2 fungible tokens is awarded to
//! the single highest bidder, while every other participant who placed at
//! least one bid receives a consolation share of all collected bids,
//! proportional to how many times they bid. Bids in different tokens are
//! compared by their USD value, obtained from a price oracle contract or
//! from a fixed per-token peg. Funding the prize pool with at least a tenth
//! of its current value resets the auction deadline.
#![cfg_attr(not(feature = "std"), no_std)]

mod contract;
mod events;
mod external;
mod state;

/// How long the auction runs after the initial funding.
const INITIAL_DURATION_MILLIS: u64 = 1000 * 60 * 60 * 24 * 7;

/// New time to live after a pool funding, replacing the previous deadline.
const EXTENSION_DURATION_MILLIS: u64 = 1000 * 60 * 60 * 24 * 10;

/// A pool funding must be worth at least `1 / POOL_SHARE_DIVISOR` of the
/// current pool value to extend the deadline.
const POOL_SHARE_DIVISOR: u128 = 10;
