//! HTTP request handlers, one module per component.

pub mod events;
pub mod health;
pub mod registrations;
pub mod rounds;
pub mod teams;

pub use health::health_check;
