//! Core client logic

pub mod connection;

#[cfg(test)]
mod tests;

pub use connection::{endpoint_url, Connection};
