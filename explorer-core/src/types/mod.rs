pub use chain_data::*;
pub use guardian_set::*;
pub use message_id::*;
pub use payload::*;
pub use records::*;
pub use vaa::*;

mod chain_data;
mod guardian_set;
mod message_id;
mod payload;
mod records;
mod vaa;
