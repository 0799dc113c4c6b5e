//! UI module root: exposes drawing functions for individual panels.

pub mod cpu;
pub mod header;
pub mod mem;
pub mod net;
pub mod payload;
pub mod util;
