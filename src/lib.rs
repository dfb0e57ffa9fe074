#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod config;
pub mod engine;
pub mod gateway;
pub mod git;
pub mod github;
pub mod install;

pub use config::Config;
pub use gateway::{router, AppState};
