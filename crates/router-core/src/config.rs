//! System-wide constants: the well-known port, datagram limits, and the
//! timing parameters that govern the announcer and neighbor monitor.

use std::time::Duration;

/// Well-known UDP port every node binds to.
pub const DEFAULT_PORT: u16 = 5000;

/// Datagrams larger than this are not expected on the wire; the transport
/// sizes its receive buffer to this value.
pub const MAX_DATAGRAM: usize = 4096;

/// Timing parameters for the periodic tasks.
///
/// Grouped into one struct (rather than three free constants) so a test
/// harness can shrink the intervals to make convergence scenarios run in
/// milliseconds instead of seconds without touching engine code.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// How often the announcer broadcasts the full table to every neighbor.
    pub route_announce_interval: Duration,
    /// How long a neighbor may stay silent before the monitor declares it
    /// inactive. Must be a small multiple (at least 3x) of
    /// `route_announce_interval` so that one or two dropped announcements
    /// don't trigger a false failure.
    pub neighbor_timeout: Duration,
    /// How often the table is printed even without a triggering change.
    pub table_print_interval: Duration,
    /// Poll period for the neighbor monitor's liveness sweep.
    pub monitor_period: Duration,
}

impl Timing {
    /// Production timing: multi-second intervals, matching the reference
    /// implementation's `ROUTE_ANNOUNCE_INTERVAL` / `NEIGHBOR_TIMEOUT` /
    /// `TABLE_PRINT_INTERVAL` constants.
    pub const fn production() -> Self {
        Self {
            route_announce_interval: Duration::from_secs(5),
            neighbor_timeout: Duration::from_secs(15),
            table_print_interval: Duration::from_secs(10),
            monitor_period: Duration::from_secs(1),
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::production()
    }
}
