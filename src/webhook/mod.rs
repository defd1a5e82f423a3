pub mod client;
pub mod normalizer;
pub mod transport;
