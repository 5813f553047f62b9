//! TeamSync assistant: a small command interpreter for managing projects and
//! tasks from a chat box, with a SQLite store and an HTTP API around it.

pub mod api;
pub mod assistant;
pub mod config;
pub mod db;
pub mod models;
pub mod store;
