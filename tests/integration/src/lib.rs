//! Integration test utilities for the gateway bridge
//!
//! This crate provides a scriptable mock gateway plus helpers for driving
//! a [`bridge_connection::ConnectionRegistry`] against it end to end.

pub mod gateway;
pub mod helpers;

pub use gateway::*;
pub use helpers::*;
