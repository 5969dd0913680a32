//! Halot Crypto - Authentication token derivation
//!
//! This crate provides:
//! - DES-CBC token derivation from the printer password
//! - The fixed key material baked into the printer firmware

mod token;

pub use token::*;
