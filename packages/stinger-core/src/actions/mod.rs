//! Reveal, restart and hide media sources on control endpoints.

mod executor;
mod scheduler;

pub use executor::{ActionExecutor, EndpointOutcome, MediaTarget, PerformTicket};
pub use scheduler::{RevertScheduler, ScheduledRevert, TokioRevertScheduler};
