//! Background workers.

mod expiration_sweeper;

pub use expiration_sweeper::{ExpirationSweeper, SweepReport, SweeperConfig, SweeperHandle};
