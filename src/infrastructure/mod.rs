//! Infrastructure layer: OS process plumbing

pub mod spawn;
