//! Brusio: a small, self-hosted community publishing service.
//!
//! Authors write text posts (optionally with an image and a group), readers
//! browse paginated feeds, comment, and follow authors for a personalized
//! feed. The global feed is served through a TTL-bounded whole-page cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
