//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the LocalStore port
//! - HTTP relay client for the RemoteStore port
//! - JSON file for the StateStore port
//! - In-memory implementations of every port for tests and embedding

pub mod duckdb;
pub mod http;
pub mod json_state;
pub mod memory;
