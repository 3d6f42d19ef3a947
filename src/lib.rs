pub mod cli;
pub mod error;
pub mod models;
pub mod processors;
pub mod readers;
pub mod setup;
pub mod utils;
pub mod writers;

pub use error::{ColocationError, Result};
pub use setup::{ColocationSetup, SetupOverrides};
