//! Simulation link trait and stub implementation.
//!
//! The external simulation engine is reachable over a control protocol:
//! open a session, advance one step, set lights, close. The
//! [`SimulationLink`] trait abstracts that protocol so the session state
//! machine can be driven by a real TCP link, or by the scripted
//! [`StubLink`] in tests.
//!
//! Every operation must complete within a bounded time; implementations
//! surface expiry as [`LinkError::Timeout`], which is retryable -- the
//! next scheduled tick retries implicitly.

use std::collections::VecDeque;

use greenwave_types::{Approach, LightState, Position, Vehicle};
use uuid::Uuid;

/// Network endpoint of the simulation engine's control port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opaque token for one open simulation session.
///
/// Guards against commands reaching a session that has since been closed
/// and reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    id: Uuid,
}

impl SessionHandle {
    /// Mint a fresh handle for a newly opened session.
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// The unique id of this session.
    pub const fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// One light head assignment within an atomic batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightCommand {
    /// Which approach's head to set.
    pub approach: Approach,
    /// The intended terminal state.
    pub state: LightState,
}

/// Errors that can occur on the simulation link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// An operation did not complete within its bounded timeout.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that expired.
        operation: &'static str,
        /// The timeout that was exceeded.
        timeout_ms: u64,
    },

    /// The transport could not be established or broke down.
    #[error("connection error: {message}")]
    Connection {
        /// Description of the transport failure.
        message: String,
    },

    /// The engine answered, but with something the protocol does not allow.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the malformed exchange.
        message: String,
    },

    /// The engine rejected the command.
    #[error("command rejected: {message}")]
    Rejected {
        /// The engine's rejection message.
        message: String,
    },

    /// No session is open on this link.
    #[error("link is closed")]
    Closed,
}

impl LinkError {
    /// Whether retrying the same operation later can succeed.
    ///
    /// Timeouts and transport failures are transient; protocol violations
    /// and rejections need an operator or engine-side fix.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connection { .. })
    }
}

/// The simulation engine's control protocol.
///
/// Methods are synchronous: the scheduler runs exactly one tick at a time
/// and implementations bound every operation with a transport timeout, so
/// a call can block briefly but never indefinitely.
pub trait SimulationLink: Send {
    /// Open a session against the engine.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] if the engine is unreachable, rejects the
    /// scenario, or does not answer within the connect timeout.
    fn open(
        &mut self,
        endpoint: &Endpoint,
        scenario: &str,
        step_interval_ms: u64,
    ) -> Result<SessionHandle, LinkError>;

    /// Advance the simulation by one step and return the new vehicle set.
    ///
    /// The returned set replaces the previous one wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] if the step fails or times out.
    fn advance(&mut self, handle: &SessionHandle) -> Result<Vec<Vehicle>, LinkError>;

    /// Apply a batch of light assignments as one atomic command.
    ///
    /// The whole batch is a single protocol exchange: either every head in
    /// the batch is applied or none is.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] if the command fails or times out.
    fn set_lights(
        &mut self,
        handle: &SessionHandle,
        batch: &[LightCommand],
    ) -> Result<(), LinkError>;

    /// Resolve a scenario reference on the engine side.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::Rejected`] if the engine cannot resolve the
    /// reference.
    fn load_scenario(&mut self, handle: &SessionHandle, reference: &str)
        -> Result<(), LinkError>;

    /// Close the session. Best-effort; the link is unusable afterwards
    /// until the next [`open`](Self::open).
    fn close(&mut self, handle: SessionHandle);
}

// ---------------------------------------------------------------------------
// Stub link
// ---------------------------------------------------------------------------

/// What the stub should yield for one `advance` call.
type ScriptedStep = Result<Vec<Vehicle>, LinkError>;

/// A scripted in-memory simulation link for tests.
///
/// Steps are played back in order; applied light batches are recorded so
/// tests can assert on atomicity and ordering. An exhausted script yields
/// empty vehicle sets.
#[derive(Debug, Default)]
pub struct StubLink {
    steps: VecDeque<ScriptedStep>,
    /// Every batch applied through [`SimulationLink::set_lights`], in order.
    pub applied_batches: Vec<Vec<LightCommand>>,
    /// Scenario references resolved through the link while connected.
    pub loaded_scenarios: Vec<String>,
    /// Number of `open` calls that succeeded.
    pub opens: u32,
    /// Number of `close` calls.
    pub closes: u32,
    fail_next_open: bool,
    fail_next_load: bool,
    open_handle: Option<SessionHandle>,
}

impl StubLink {
    /// Create a stub with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one successful step yielding the given vehicle set.
    pub fn push_step(&mut self, vehicles: Vec<Vehicle>) {
        self.steps.push_back(Ok(vehicles));
    }

    /// Queue one failing step.
    pub fn push_step_failure(&mut self) {
        self.steps.push_back(Err(LinkError::Timeout {
            operation: "step",
            timeout_ms: 2_000,
        }));
    }

    /// Make the next `open` call fail with a connection error.
    pub const fn fail_next_open(&mut self) {
        self.fail_next_open = true;
    }

    /// Make the next `load_scenario` call fail with a rejection.
    pub const fn fail_next_load(&mut self) {
        self.fail_next_load = true;
    }

    /// Convenience constructor for a scripted vehicle.
    ///
    /// The lane name encodes the axis, mirroring how the simulation names
    /// approach lanes (e.g. `north_in_0`).
    pub fn vehicle(id: &str, lane: &str, speed: f64) -> Vehicle {
        Vehicle {
            id: id.to_owned(),
            kind: String::from("car"),
            speed,
            position: Position { x: 0.0, y: 0.0 },
            lane: lane.to_owned(),
            route: vec![String::from("edge_in"), String::from("edge_out")],
        }
    }

    /// Queue `north_south` vehicles on a north lane and `east_west`
    /// vehicles on an east lane, all moving at a nominal speed.
    pub fn push_axis_counts(&mut self, north_south: u32, east_west: u32) {
        let mut vehicles = Vec::new();
        for i in 0..north_south {
            vehicles.push(Self::vehicle(&format!("ns_{i}"), "north_in_0", 10.0));
        }
        for i in 0..east_west {
            vehicles.push(Self::vehicle(&format!("ew_{i}"), "east_in_0", 10.0));
        }
        self.push_step(vehicles);
    }
}

impl SimulationLink for StubLink {
    fn open(
        &mut self,
        _endpoint: &Endpoint,
        _scenario: &str,
        _step_interval_ms: u64,
    ) -> Result<SessionHandle, LinkError> {
        if self.fail_next_open {
            self.fail_next_open = false;
            return Err(LinkError::Connection {
                message: String::from("scripted open failure"),
            });
        }
        let handle = SessionHandle::new();
        self.open_handle = Some(handle);
        self.opens = self.opens.saturating_add(1);
        Ok(handle)
    }

    fn advance(&mut self, handle: &SessionHandle) -> Result<Vec<Vehicle>, LinkError> {
        if self.open_handle.as_ref() != Some(handle) {
            return Err(LinkError::Closed);
        }
        self.steps.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn set_lights(
        &mut self,
        handle: &SessionHandle,
        batch: &[LightCommand],
    ) -> Result<(), LinkError> {
        if self.open_handle.as_ref() != Some(handle) {
            return Err(LinkError::Closed);
        }
        self.applied_batches.push(batch.to_vec());
        Ok(())
    }

    fn load_scenario(
        &mut self,
        handle: &SessionHandle,
        reference: &str,
    ) -> Result<(), LinkError> {
        if self.open_handle.as_ref() != Some(handle) {
            return Err(LinkError::Closed);
        }
        if self.fail_next_load {
            self.fail_next_load = false;
            return Err(LinkError::Rejected {
                message: format!("scripted rejection of {reference}"),
            });
        }
        self.loaded_scenarios.push(reference.to_owned());
        Ok(())
    }

    fn close(&mut self, handle: SessionHandle) {
        if self.open_handle == Some(handle) {
            self.open_handle = None;
            self.closes = self.closes.saturating_add(1);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint {
            host: String::from("localhost"),
            port: 8813,
        }
    }

    #[test]
    fn stub_plays_script_then_idles() {
        let mut link = StubLink::new();
        link.push_axis_counts(2, 1);
        let handle = link.open(&endpoint(), "traffic.sumocfg", 1_000).unwrap();

        let first = link.advance(&handle).unwrap();
        assert_eq!(first.len(), 3);

        // Script exhausted: empty network.
        let second = link.advance(&handle).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn stale_handle_is_rejected() {
        let mut link = StubLink::new();
        let stale = SessionHandle::new();
        assert!(matches!(link.advance(&stale), Err(LinkError::Closed)));
    }

    #[test]
    fn scripted_failures_surface() {
        let mut link = StubLink::new();
        link.push_step_failure();
        let handle = link.open(&endpoint(), "traffic.sumocfg", 1_000).unwrap();
        let err = link.advance(&handle).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn rejection_is_not_retryable() {
        let err = LinkError::Rejected {
            message: String::from("bad scenario"),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn close_invalidates_handle() {
        let mut link = StubLink::new();
        let handle = link.open(&endpoint(), "traffic.sumocfg", 1_000).unwrap();
        link.close(handle);
        assert!(matches!(link.advance(&handle), Err(LinkError::Closed)));
        assert_eq!(link.closes, 1);
    }
}
