//! # Bundle Search Core
//!
//! Shared logic for Bundle Search: catalog models, intent parsing, the
//! similarity query builder, and the store and embedding traits.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or HTTP clients.
//! The application crate supplies concrete providers (fastembed, Ollama,
//! Anthropic, Postgres) and passes them to the functions defined here.

pub mod embedding;
pub mod intent;
pub mod models;
pub mod query;
pub mod store;
