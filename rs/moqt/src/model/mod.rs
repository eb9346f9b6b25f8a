mod group;
mod track;

pub use group::*;
pub use track::*;
