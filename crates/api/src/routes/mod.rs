//! Route Handlers

pub mod documents;
pub mod health;
pub mod rules;
