//! API request handlers.

/// Liveness handler.
pub mod health;
/// Research run streaming handler.
pub mod research;
