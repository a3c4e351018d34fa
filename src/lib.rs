//! Gator - a command-line RSS aggregator
//!
//! Users register and follow feeds; the `agg` command polls the feed fetched
//! longest ago on a fixed interval and stores its new items as posts,
//! deduplicated by URL.

pub mod commands;
pub mod config;
pub mod db;
pub mod fetcher;
pub mod scheduler;
pub mod scraper;
