//! # Statekeep - Snapshot Persistence for Browser Game Saves
//!
//! Statekeep stores per-player game state as a bounded history of JSON
//! snapshots. Browser clients save noisily (tab close, `sendBeacon`,
//! background timers, saves racing ahead of hydration); statekeep accepts all
//! of it without letting a blank save overwrite real progress.
//!
//! ## Features
//!
//! - **Normalization**: any inbound JSON is coerced into a canonical [`snapshot::Snapshot`].
//! - **Empty-like filtering**: saves with no coins, items, bank or ammo are acknowledged but never stored.
//! - **Capped ring**: each user keeps the most recent `max_snapshots` entries, oldest evicted first.
//! - **Resilient reads**: missing or corrupt documents read as "nothing saved yet".
//! - **Serialized writers**: concurrent saves for one user are applied in turn, never lost.
//! - **Crash-safe files**: whole-document rewrites go through a locked temp file and atomic rename.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use statekeep::config::Config;
//! use statekeep::http::server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     server::serve(&config).await
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`snapshot`] - data model, normalizer, emptiness classifier, retrieval
//! - [`storage`] - per-user document store
//! - [`http`] - request handling and the axum router
//! - [`config`] - configuration management
//! - [`validation`] - filename mapping and bounded JSON parsing
//! - [`errors`] - write-path error type
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   HTTP Layer    │ ← GET/POST /state/{user}
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Snapshot Store  │ ← load / append-with-cap / persist
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ Normalizer and  │ ← pure functions over Snapshot
//! │ Classifier      │
//! └─────────────────┘
//! ```

pub mod config;
pub mod errors;
pub mod http;
pub mod logutil;
pub mod snapshot;
pub mod storage;
pub mod validation;
