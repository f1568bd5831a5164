pub mod api;
pub mod chat;
pub mod error;
pub mod hubspot;
pub mod state;
pub mod types;
