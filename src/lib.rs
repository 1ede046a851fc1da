pub mod catalog;
pub mod config;
pub mod display;
pub mod error;
pub mod export;
pub mod models;
pub mod parser;
pub mod payload;
pub mod prompt;
pub mod providers;
pub mod retry;
pub mod server;
pub mod service;
pub mod session;
pub mod transport;
pub mod validation;

pub use error::{Result, SongwrightError};
pub use server::SongwrightServer;
pub use service::SongwrightService;
