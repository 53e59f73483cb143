//! # MindField
//!
//! A dual-hemisphere document ingestion and semantic retrieval bridge.
//!
//! MindField converts annotated source documents into paragraph-level
//! fragment records, synthesizes compass summaries from paired geometric
//! metadata, embeds each record family in its own vector space, and answers
//! queries by searching both spaces and merging the ranked results.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────────┐
//! │ raw markdown │──▶│  Segmenter   │──▶│ texture collection │
//! │              │   │ local embed  │   │  (local space)     │
//! └──────────────┘   └──────────────┘   └─────────┬─────────┘
//! ┌──────────────┐   ┌──────────────┐   ┌─────────┴─────────┐
//! │ geometry json│──▶│ Synthesizer  │──▶│ orientation coll.  │
//! │              │   │ cloud embed  │   │  (cloud space)     │
//! └──────────────┘   └──────────────┘   └─────────┬─────────┘
//!                                                 │
//!                                   ┌─────────────┴──────────┐
//!                                   ▼                        ▼
//!                              ┌──────────┐            ┌──────────┐
//!                              │   CLI    │            │   HTTP   │
//!                              │   (mf)   │            │ /query   │
//!                              └──────────┘            └──────────┘
//! ```
//!
//! The two embedding spaces are never compared or mixed: each hemisphere
//! embeds the query with its own model and searches its own collection.
//!
//! ## Quick Start
//!
//! ```bash
//! mf init                     # create the local vector store
//! mf ingest fragments         # raw markdown -> fragments JSONL
//! mf ingest compasses         # geometry JSON -> compasses JSONL
//! mf index texture            # embed fragments into the texture collection
//! mf index orientation        # embed compasses into the orientation collection
//! mf query "threshold states" # run the bridge once
//! mf serve                    # start the HTTP bridge server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Fragment, compass, and bridge response types |
//! | [`segment`] | Markdown cleaning and paragraph segmentation |
//! | [`compass`] | Node/field pairing synthesis |
//! | [`ingest`] | Directory scan and JSONL record writers |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Vector collection storage (local SQLite or cloud) |
//! | [`index_cmd`] | Batch embed-and-upsert for both hemispheres |
//! | [`bridge`] | Dual-space query bridge |
//! | [`present`] | Bridge response formatting |
//! | [`server`] | HTTP query server |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Local store schema migrations |

pub mod bridge;
pub mod compass;
pub mod config;
pub mod db;
pub mod embedding;
pub mod index_cmd;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod present;
pub mod segment;
pub mod server;
pub mod store;
