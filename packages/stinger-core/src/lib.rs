//! Stinger Core - routes live match events to OBS media playback.
//!
//! A single event source (a Rocket League stats relay) emits `game:*` events
//! over WebSocket. The [`services::Orchestrator`] reacts by revealing, restarting
//! and later hiding media sources on every connected OBS instance. Operators
//! drive the same actions by hand through the command side channel in [`api`].
//!
//! # Architecture
//!
//! - [`endpoint`]: Endpoint configuration, health state and the connection supervisor
//! - [`router`]: `(channel, event)` subscriptions, remote registration and dispatch
//! - [`source`]: The event-source listening loop
//! - [`control`]: The control-surface abstraction and the obs-websocket client
//! - [`actions`]: Reveal/restart/revert against control endpoints
//! - [`services`]: Domain wiring on top of the router and executor
//! - [`api`]: WebSocket command server
//! - [`bootstrap`]: Composition root
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting endpoint and playback events
//! - [`ControlSurface`](control::ControlSurface) / [`ControlConnector`](control::ControlConnector): OBS access
//! - [`RevertScheduler`](actions::RevertScheduler): Delayed hide of revealed media
//! - [`MatchStatePersistence`](services::MatchStatePersistence): Saving the selected match

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod actions;
pub mod api;
pub mod bootstrap;
pub mod control;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod protocol_constants;
pub mod router;
pub mod runtime;
pub mod services;
pub mod source;
pub mod state;
pub mod utils;

#[cfg(test)]
mod test_fixtures;

pub use bootstrap::{bootstrap_services, bootstrap_services_with, BootstrappedServices};
pub use endpoint::{ConnectionState, EndpointConfig, EndpointRole};
pub use error::{ErrorCode, StingerError, StingerResult};
pub use events::{BroadcastEvent, BroadcastEventBridge, EventEmitter};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use services::{MatchStatePersistence, NoopMatchStatePersistence, Orchestrator};
pub use state::{Config, MatchPairing, SceneConfig, TimingConfig};
