pub mod chain;
pub mod city;
pub mod client;
pub mod deployment;
pub mod ui;
pub mod wallets;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use chain::{
    CityContract,
    KeystoreConnector,
    WalletConnector,
};
pub use city::{
    CityRecord,
    GamePhase,
    Structure,
};
