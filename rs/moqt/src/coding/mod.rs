mod decode;
mod encode;
mod reader;
mod stream;
mod version;
mod writer;

pub use decode::*;
pub use encode::*;
pub use reader::*;
pub use stream::*;
pub use version::*;
pub use writer::*;
