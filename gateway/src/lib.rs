//! Supervising HTTP/SSE gateway for a stdio analytics tool server

pub mod bridge;
pub mod child;
pub mod config;
pub mod error;
pub mod web;
