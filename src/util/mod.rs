//! Internal filesystem helpers.

pub mod atomic;
