//! Common utilities and types shared across Gatehouse crates.

#![warn(clippy::pedantic)]

/// Module for shared observability configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (size limits, header inspection, iat checks)
pub mod jwt;

/// Module for cache status reporting shared by the verification caches
pub mod cache;
