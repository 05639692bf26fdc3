//! Shared building blocks: configuration, identities, vector math

pub mod config;
pub mod identity;
pub mod kmeans;
pub mod paths;
pub mod vector;

pub use config::Config;
pub use identity::FileIdentity;
