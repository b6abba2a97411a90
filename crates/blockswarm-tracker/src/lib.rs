//! # blockswarm Tracker
//!
//! Lightweight rendezvous service: it only hands out peer addresses and has
//! no knowledge of block ownership.
//!
//! - [`TrackerRegistry`] - peer → last contact, TTL expiry, random sampling
//! - [`TrackerServer`] - TCP accept loop plus the periodic sweep
//! - [`TrackerClient`] - the announce call used by peer agents

pub mod client;
pub mod registry;
pub mod server;

pub use client::TrackerClient;
pub use registry::{Announcement, TrackerRegistry};
pub use server::{TrackerServer, TrackerServerConfig};
