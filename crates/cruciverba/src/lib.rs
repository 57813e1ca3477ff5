//! Aggregate a puzzle publication history into a calendar heatmap with
//! faceted filters.

pub mod calendar;
pub mod config;
pub mod data;
pub mod dates;
pub mod error;
pub mod filter;
pub mod html;
pub mod server;
pub mod types;

pub use error::{Error, Result};
