//! Domain safety monitor server: the scan pipeline plus the authenticated
//! HTTP surface and scheduler that trigger it.

pub mod api;
pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod logging;
pub mod scan;
pub mod state;
