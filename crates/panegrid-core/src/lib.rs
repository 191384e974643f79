#![forbid(unsafe_code)]

//! Geometric primitives shared by the panegrid engine and host adapters.

pub mod geometry;

pub use geometry::{Point, Rect};
