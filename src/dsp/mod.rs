//! Digital signal processing applied to the mixed stream.

pub mod filters;
