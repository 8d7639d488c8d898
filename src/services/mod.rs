pub mod auth;
pub mod message_service;
pub mod presence;
pub mod router;
