//! # Storefront API Module
//!
//! - `client`: reqwest JSON client with envelope unwrapping and error mapping
//! - `models`: typed resource shapes
//! - `resources`: per-collection facade over the data provider

pub mod client;
pub mod models;
pub mod resources;

pub use client::ApiClient;
pub use models::{ApiModel, Booking, DashboardStats, DocumentId, Reference, Review, Tour, User};
pub use resources::{DashboardResource, FetchFn, Resource, Resources};
