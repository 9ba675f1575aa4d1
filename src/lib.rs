//! Grundbuch backend - order intake and payment processing for land-register extracts
//!
//! This library provides the core functionality for the order backend, including
//! the SQLite order store, Stripe and PayPal integration, webhook reconciliation,
//! and the HTTP API handlers.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod payments;
