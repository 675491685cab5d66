pub mod basic_functions;
pub mod config;
pub mod error;
