//! services/api/src/lib.rs
//!
//! The library crate for the storybook API service. The `api` binary wires
//! these modules into a running server; the `openapi` binary renders the
//! REST specification.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
