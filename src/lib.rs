//! rentwatch - rental listing acquisition and matching.
//!
//! Ingests listings from third-party rental sites under politeness
//! constraints, deduplicates them into a canonical store, and scores them
//! against saved search preferences to produce matches for downstream
//! notification.

pub mod cli;
pub mod config;
pub mod matcher;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod scrapers;
pub mod utils;
