//! # Qdrant Search
//!
//! Natural-language search over a Qdrant collection, exposed to AI tools
//! through an MCP stdio server and a small HTTP API.
//!
//! A query is embedded with the OpenAI embeddings API, matched against the
//! collection's vectors, and returned as readable text plus the raw hits.
//! The collection is populated elsewhere; this crate only reads it.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────┐   ┌──────────┐
//!  │   MCP    │   │   HTTP   │
//!  │ (stdio)  │   │/mcp-tools│
//!  └────┬─────┘   └────┬─────┘
//!       └──────┬───────┘
//!              ▼
//!       ┌──────────────┐   ┌───────────┐
//!       │ QueryHandler │──▶│ Formatter │
//!       └──┬────────┬──┘   └───────────┘
//!          ▼        ▼
//!     ┌────────┐ ┌────────┐
//!     │ OpenAI │ │ Qdrant │
//!     └────────┘ └────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and `QDRANT_*` environment overrides |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`qdrant`] | Vector store abstraction and Qdrant REST client |
//! | [`format`] | Result formatting with payload field fallbacks |
//! | [`handler`] | Tool dispatch shared by both servers |
//! | [`mcp`] | MCP stdio server |
//! | [`server`] | HTTP server |
//! | [`inspect`] | Collection readiness check |

pub mod config;
pub mod embedding;
pub mod format;
pub mod handler;
pub mod inspect;
pub mod mcp;
pub mod qdrant;
pub mod server;
