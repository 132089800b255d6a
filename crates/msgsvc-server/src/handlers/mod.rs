//! HTTP handlers

pub mod commands;
pub mod health;
