//! Libportal - Library portal backend
//!
//! This library provides the session lifecycle, reference-data cache, book
//! normalization and proxy relay behind the library portal.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod portal;
pub mod relay;
pub mod services;
pub mod session;

#[cfg(test)]
mod testing;
