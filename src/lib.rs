//! Parlay - autonomous trading daemon for binary prediction markets.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── core/              # Reusable library components
//! │   ├── domain/        # Pure entity types
//! │   ├── db/ store/     # Diesel schema + repository contract
//! │   ├── exchange/      # Catalog REST, trading API, book stream
//! │   ├── signal/        # Hub + collectors
//! │   ├── strategy/      # Tick engine + evaluators
//! │   ├── trade/         # Opportunities, risk, planning, execution
//! │   ├── portfolio/     # Positions, settlement, journal, reviews
//! │   └── service/       # Catalog sync, ingest, labeler, scheduler
//! ├── app/               # Configuration + orchestration
//! └── cli/               # run / check subcommands
//! ```
//!
//! The pipeline: catalog+book ingestion → signal hub → strategy engine →
//! opportunity manager → execution planner → risk preflight → order
//! executor → fill reconciliation → position/PnL/journal.

pub mod app;
pub mod cli;
pub mod core;
pub mod error;
