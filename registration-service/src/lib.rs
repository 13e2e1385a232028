//! Registration service: Razorpay order creation, checkout verification, and
//! sequential participant numbering for a single event.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{AppState, Application};
