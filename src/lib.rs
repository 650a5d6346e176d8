//! # linkweave
//!
//! A semantic enrichment and backlink graph engine for plain-text
//! document corpora.
//!
//! linkweave sweeps a corpus of markdown/text documents, computes
//! semantic relationships between them with an embedding +
//! classification model, and maintains a bidirectional link graph
//! ("backlinks") embedded in the documents themselves. A content-hash
//! ledger makes reprocessing idempotent and incremental.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────────────┐   ┌─────────────┐
//! │    Corpus    │──▶│      Enrichment sweep      │──▶│  Documents  │
//! │   adapter    │   │ analyze · detect · resolve │   │ (backlinks) │
//! └──────────────┘   └──────────┬────────────────┘   └─────────────┘
//!                               │
//!                  ┌────────────┴───────────┐
//!                  ▼                        ▼
//!           ┌─────────────┐          ┌─────────────┐
//!           │  Language   │          │   Change    │
//!           │    model    │          │   tracker   │
//!           └─────────────┘          └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`corpus`] | Corpus adapter trait + filesystem implementation |
//! | [`tracker`] | Content-hash idempotency ledger |
//! | [`capability`] | Embedding/classification capability trait + providers |
//! | [`analyzer`] | Per-document semantic analysis |
//! | [`detector`] | Semantic relationship detection |
//! | [`wikilink`] | Explicit `[[link]]` extraction and resolution |
//! | [`backlinks`] | Backlink section maintenance |
//! | [`frontmatter`] | Frontmatter tag merging |
//! | [`sweep`] | End-to-end sweep orchestration |

pub mod analyzer;
pub mod backlinks;
pub mod capability;
pub mod config;
pub mod corpus;
pub mod detector;
pub mod frontmatter;
pub mod models;
pub mod similarity;
pub mod sweep;
pub mod tracker;
pub mod wikilink;
