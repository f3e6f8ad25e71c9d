//! The web module for the block-programming client surface.

pub mod api;
