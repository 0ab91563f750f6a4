//! HTTP surface for the warden credential and session authority.

pub mod api;
pub mod config;
pub mod logging;
