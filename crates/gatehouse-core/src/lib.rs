//! Core types and trait definitions for the Gatehouse broker.
//!
//! This crate is deliberately free of HTTP, database, and crypto
//! dependencies. All other crates depend on it; it depends on nothing
//! proprietary.

pub mod audit;
pub mod boundary;
pub mod cache;
pub mod connector;
pub mod credential;
pub mod error;
pub mod filter;
pub mod manifest;
pub mod row;
pub mod staging;
pub mod store;

pub use error::{Error, Result};
