//! GitHub repository traffic rendered as an animated SVG line chart, served
//! from a two-tier cache that refreshes itself in the background.

pub mod cache;
pub mod charts;
pub mod color;
pub mod config;
pub mod error;
pub mod github;
pub mod refresh;
pub mod routes;
pub mod service;
pub mod settings;
pub mod theme;
pub mod traffic;
