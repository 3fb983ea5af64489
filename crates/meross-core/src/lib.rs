/*!
 * Meross Core
 *
 * This crate provides the ambient pieces shared by the Meross connector:
 * the error taxonomy, layered configuration, logging setup and async helpers.
 */

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod utils;

/// Meross core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
