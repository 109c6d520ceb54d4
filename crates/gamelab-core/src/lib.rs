//! Gamelab Core - Core types for the game-server lab deployer
//!
//! This crate provides the foundational types used throughout gamelab:
//! - `LabConfig`: The validated lab configuration (ingress, TLS, Arma 3 mods)
//! - `Document`: A single parsed Kubernetes manifest
//! - `ManifestStore`: The flattened, ordered set of documents to deploy

pub mod config;
pub mod document;
pub mod error;
pub mod store;

pub use config::{Arma3, CertManager, Issuer, LabConfig, ModSpec, Nginx, Secret, SteamCmd};
pub use document::Document;
pub use error::{CoreError, Result};
pub use store::ManifestStore;
