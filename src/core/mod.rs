//! Core types shared by every module: the provider error type and the
//! configuration tree.

pub mod config;
pub mod error;
