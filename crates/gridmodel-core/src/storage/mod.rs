//! Text formats: `.grd` sheets in, markdown reports out.

pub mod grd;
pub mod md;
