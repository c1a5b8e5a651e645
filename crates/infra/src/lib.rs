//! Infrastructure layer: event store, dispatch, read models, notices, config.
//!
//! Everything here is synchronous and in-process. Durable backends would slot
//! in behind the [`event_store::EventStore`] and [`read_model::ReadModelStore`]
//! traits without touching the domain crates.

pub mod audit;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod service;
pub mod workers;


pub use service::{NewOrder, ProcurementService};
