pub mod client;
pub mod expr;
