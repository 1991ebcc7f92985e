pub use encode::*;
pub use guardian::*;
pub use provider::*;
pub use sink::*;

mod encode;
mod guardian;
mod provider;
mod sink;
