// ABOUTME: PostgreSQL utilities module
// ABOUTME: Exports connection management and the PostgreSQL transfer backend

pub mod backend;
pub mod connection;

pub use connection::connect;
