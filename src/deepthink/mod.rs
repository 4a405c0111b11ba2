// src/deepthink/mod.rs

pub mod clients;
pub mod config;
pub mod conversation_log;
pub mod error;
pub mod event;
pub mod gateway;
pub mod http_client_pool;
pub mod identity;
pub mod router;
pub mod schema;

// Let's explicitly export DeepThink so it can be reached as deepthink::deepthink::DeepThink
// and not only through the router module.
pub use router::DeepThink;
