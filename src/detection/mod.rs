pub mod channel;
pub mod debounce;

pub use channel::{ChannelSession, Side};
pub use debounce::DebounceCounter;
