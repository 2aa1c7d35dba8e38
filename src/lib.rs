//! Print job relay
//!
//! This library backs two processes: the internet-facing queue service
//! that accepts uploads and hands out jobs, and the dispatch agent
//! that runs next to the printer, pulls claimed jobs over HTTP and
//! reports the outcome. No inbound access to the printer's network is
//! ever required.

pub mod agent;
pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
