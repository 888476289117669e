pub mod analysis;
pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod leagues;
pub mod metrics;
pub mod normalizer;
pub mod page_parser;
pub mod pipeline;
pub mod report;
pub mod types;
pub mod utils;
pub mod web;
