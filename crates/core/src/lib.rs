//! Core costing logic for Stockcost.
//!
//! This crate has ZERO web or database dependencies. Cost layers, layer
//! selection, the costing engine and its storage traits live here; the
//! `stockcost-db` crate implements the traits on PostgreSQL.
//!
//! # Modules
//!
//! - `costing` - Cost layers, COGS calculation, ledger, summaries and valuation

pub mod costing;
