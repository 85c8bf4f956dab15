//! I/O utilities for gridalign
//!
//! Provides byte-level primitives for reading raster containers.

pub mod byte_order;

pub use byte_order::ByteOrder;
