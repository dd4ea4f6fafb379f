//! Shared types used across modules.

pub mod tool;
