//! Utility functions and helpers.

pub mod html;
