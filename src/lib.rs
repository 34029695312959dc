//! Wingo - timed color/number betting round engine
//!
//! Every round a digit 0-9 is declared, either by an admin or by a selector
//! that ranks all ten outcomes by house profit. Bets on the digit, its color
//! or its size are then settled against player wallets.

pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod games;
pub mod notify;
pub mod scheduler;
pub mod store;

pub use config::{ConfigLoader, WingoConfig};
pub use engine::{
    CancellationSummary, DeclarationSummary, EngineBuilder, GameEngine, PlaceBetRequest, TickReport,
};
pub use errors::{WingoError, WingoResult};
pub use scheduler::RoundScheduler;
pub use store::{GameStore, MemoryStore};
