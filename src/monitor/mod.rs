pub mod backoff;
pub mod controller;
mod loop_worker;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use backoff::Backoff;
pub use controller::SessionController;
pub use state::{WeldCounts, WorkerPhase};
