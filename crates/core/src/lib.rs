//!
//! # omadm_core
//!
//! Core protocol engine for a SyncML 1.2 / OMA Device Management server.
//!
//! This crate is transport-agnostic: it knows how to decode a SyncML message
//! (XML or WBXML), authenticate it, drive a per-device session state machine,
//! and build the SyncML response. The HTTP adapter, package file store, and
//! configuration loading live in the `omadm-server` binary crate.
//!
pub mod auth;
pub mod catalog;
pub mod dispatch;
mod error;
pub mod session;
pub mod syncml;
pub mod wbxml;

pub use error::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
