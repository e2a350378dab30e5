//! Driving adapters: batch input and output formats.

pub mod csv;
