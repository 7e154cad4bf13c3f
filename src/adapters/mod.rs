// Adapters layer: concrete implementations for external systems.

pub mod adls;
pub mod azure_auth;
pub mod github;
pub mod http;
pub mod key_vault;
pub mod sqlite;
pub mod storage;
pub mod vidclub;
