pub mod events;
pub mod handler;
pub mod hub;
