// Adapters layer: concrete implementations for external systems (http, sqlite)

pub mod http;
pub mod schema;
pub mod storage;
