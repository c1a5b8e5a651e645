//! Process-wide tracing setup shared by the binaries.

/// Install the JSON subscriber with the `info` default filter.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    tracing::init_with("info");
}

/// Subscriber configuration (filters, formatting).
pub mod tracing;
