// SPDX-License-Identifier: MIT OR Apache-2.0

//! m3embed - Dense, sparse and multi-vector embedding library
//!
//! Shared modules for the m3embed CLI tool.

pub mod config;
pub mod embedding;
pub mod errors;
pub mod output;
