//! Application-level error types shared by the HTTP surface and the binary.

pub mod error;
