pub mod chat_repo;
pub mod kv_store;
pub mod migrations;
