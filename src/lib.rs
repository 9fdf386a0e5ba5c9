//! # Bundle Search
//!
//! Natural-language semantic search over a catalog of digital-goods bundles.
//!
//! Bundle records are loaded from newline-delimited JSON into Postgres with
//! pgvector, each bundle, item and charity carrying a sentence embedding of
//! its description. A query is classified by a language model into a
//! structured intent, its search text is embedded with the same model, and a
//! filtered nearest-neighbour query returns the closest bundles.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ bundles-*.jsonl│─▶│  Ingestion   │──▶│  Postgres    │
//! │               │   │ embed+cache  │   │  + pgvector  │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              │
//!          ┌──────────┐   ┌──────────┐   ┌─────┴──────┐
//!  query ─▶│  Intent  │──▶│  Embed   │──▶│ BundleQuery│─▶ CLI / HTTP
//!          │ (Claude) │   │          │   │            │
//!          └──────────┘   └──────────┘   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! bundle-search init                      # create tables and indexes
//! bundle-search load --data-dir ./data    # ingest bundles-*.jsonl
//! bundle-search search "cozy farming games on sale now" --debug
//! bundle-search serve                     # HTML + JSON front end
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`db`] | Postgres connection pool |
//! | [`migrate`] | Schema and vector indexes |
//! | [`pg_store`] | Postgres catalog store |
//! | [`source`] | Source file discovery and record parsing |
//! | [`cache`] | Persistent embedding cache |
//! | [`ingest`] | Ingestion pipeline |
//! | [`embedding`] | Embedding providers |
//! | [`classifier`] | Anthropic intent classifier |
//! | [`search`] | Query pipeline |
//! | [`server`] | HTTP front end |
//! | [`stats`] | Catalog row counts |
//! | [`testing`] | Test doubles for the external services |

pub mod cache;
pub mod classifier;
pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod migrate;
pub mod pg_store;
pub mod search;
pub mod server;
pub mod source;
pub mod stats;
pub mod testing;
