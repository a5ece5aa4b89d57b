// ABOUTME: Library module for tsvio
// ABOUTME: Exports the transfer engine, database backends and commands for the binary and tests

pub mod backend;
pub mod commands;
pub mod config;
pub mod error;
pub mod mysql;
pub mod postgres;
pub mod schema;
pub mod sqlite;
pub mod transfer;
pub mod utils;

pub use backend::{open_database, Database, TransferBackend};
pub use error::{TransferError, TransferResult};
