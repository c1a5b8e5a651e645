//! Background consumers of the event bus.

pub mod bus_worker;
pub mod notification_worker;

pub use bus_worker::{BusWorker, WorkerHandle};
pub use notification_worker::NotificationWorker;
