//! Backend adapters shipped with the crate.

pub mod json;
