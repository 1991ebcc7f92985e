pub use chains::*;
pub use guardian::*;
pub use sinks::*;

mod chains;
mod guardian;
mod sinks;
