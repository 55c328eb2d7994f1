//! Data-quality stages applied to bars before and after persistence.
//!
//! - [`ohlc`]: the OHLC invariant corrector, always on.
//! - [`bad_tick`]: wick/volume outlier filter with configurable repair.
//! - [`post_hoc`]: re-applies the corrector to bars already in a store.

pub mod bad_tick;
pub mod ohlc;
pub mod post_hoc;
