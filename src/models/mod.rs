pub mod action;
pub mod config;
pub mod message;
pub mod session;
pub mod settings;
