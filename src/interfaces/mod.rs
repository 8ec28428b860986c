//! Thin front ends driving the application layer.

pub mod csv;
