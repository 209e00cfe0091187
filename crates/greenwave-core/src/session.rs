//! Session state machine for the simulation engine connection.
//!
//! Exactly one session exists per running instance. The [`SessionManager`]
//! owns the link, the connection status, the fixed four-light set, the
//! step counter, and the current vehicle set. Every state-mutating
//! operation completes fully before the caller publishes the next
//! snapshot, so consumers never observe a half-applied transition.
//!
//! # Invariants
//!
//! - No step or light command is issued unless the status is `Connected`.
//! - The vehicle set is replaced wholesale each step, never merged.
//! - Light batches are one protocol exchange: all four heads or none.

use std::collections::BTreeMap;

use greenwave_types::{
    Approach, Axis, ConnectionStatus, LastError, LightState, TrafficLight, Vehicle,
};
use tracing::{info, warn};

use crate::config::SimulationConfig;
use crate::link::{Endpoint, LightCommand, LinkError, SessionHandle, SimulationLink};

/// Errors produced by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Session open or close failed. Retryable by re-invoking connect.
    #[error("connection error: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },

    /// A scenario reference could not be resolved. Needs an operator fix.
    #[error("scenario error: {message}")]
    Scenario {
        /// Description of the failure.
        message: String,
    },

    /// A single step or light command failed. The next scheduled tick
    /// retries implicitly.
    #[error("simulation error: {source}")]
    Sim {
        /// The underlying link error.
        #[from]
        source: LinkError,
    },

    /// The operation is not valid in the current connection state.
    #[error("{operation} is not valid while {status:?}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The status it was attempted in.
        status: ConnectionStatus,
    },
}

/// Owner of the simulation session lifecycle and per-step state.
pub struct SessionManager {
    link: Box<dyn SimulationLink>,
    config: SimulationConfig,
    status: ConnectionStatus,
    handle: Option<SessionHandle>,
    scenario: String,
    lights: BTreeMap<Approach, TrafficLight>,
    step_count: u64,
    vehicles: Vec<Vehicle>,
    last_error: Option<LastError>,
}

impl SessionManager {
    /// Create a disconnected session manager over the given link.
    pub fn new(link: Box<dyn SimulationLink>, config: SimulationConfig) -> Self {
        let scenario = config.scenario.clone();
        Self {
            link,
            config,
            status: ConnectionStatus::Disconnected,
            handle: None,
            scenario,
            lights: BTreeMap::new(),
            step_count: 0,
            vehicles: Vec::new(),
            last_error: None,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open the session and initialize the fixed four-light set.
    ///
    /// Transitions Disconnected -> Connecting -> Connected. On success the
    /// lights start in complementary pairs (north/south red, east/west
    /// green) and any previous error state is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] if a session is already open
    /// or the engine cannot be reached; the status falls back to
    /// `Disconnected` on failure.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        match self.status {
            ConnectionStatus::Connected => {
                return Err(SessionError::Connection {
                    message: String::from("already connected"),
                });
            }
            ConnectionStatus::Connecting | ConnectionStatus::Disconnecting => {
                return Err(SessionError::InvalidState {
                    operation: "connect",
                    status: self.status,
                });
            }
            ConnectionStatus::Disconnected => {}
        }

        self.status = ConnectionStatus::Connecting;
        let endpoint = self.endpoint();
        info!(endpoint = %endpoint, scenario = self.scenario, "opening simulation session");

        match self
            .link
            .open(&endpoint, &self.scenario, self.config.step_interval_ms)
        {
            Ok(handle) => {
                self.handle = Some(handle);
                self.status = ConnectionStatus::Connected;
                self.lights = default_lights();
                self.step_count = 0;
                self.vehicles.clear();
                self.last_error = None;
                info!(session_id = %handle.id(), "simulation session connected");
                Ok(())
            }
            Err(e) => {
                self.status = ConnectionStatus::Disconnected;
                Err(SessionError::Connection {
                    message: format!("failed to open session at {endpoint}: {e}"),
                })
            }
        }
    }

    /// Close the session, clearing the step counter, the vehicle set, and
    /// the light set.
    ///
    /// Idempotent: a no-op when already disconnected. Callers force
    /// `running = false` before invoking this, and the control loop only
    /// services the request between ticks, so an in-flight tick always
    /// completes first.
    pub fn disconnect(&mut self) {
        if self.status == ConnectionStatus::Disconnected {
            return;
        }

        self.status = ConnectionStatus::Disconnecting;
        if let Some(handle) = self.handle.take() {
            self.link.close(handle);
        }
        self.status = ConnectionStatus::Disconnected;
        self.step_count = 0;
        self.vehicles.clear();
        self.lights.clear();
        info!("simulation session disconnected");
    }

    /// Load a scenario reference.
    ///
    /// Valid only while Disconnected or Connected; never mutates the
    /// connection status. While Connected the reference is resolved on the
    /// engine; while Disconnected it is validated and stored for the next
    /// connect.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Scenario`] for an empty reference or an
    /// engine-side rejection, and [`SessionError::InvalidState`] during a
    /// transition.
    pub fn load_scenario(&mut self, reference: &str) -> Result<(), SessionError> {
        if reference.trim().is_empty() {
            return Err(SessionError::Scenario {
                message: String::from("scenario reference is empty"),
            });
        }

        match self.status {
            ConnectionStatus::Disconnected => {
                self.scenario = reference.to_owned();
                info!(scenario = reference, "scenario stored for next connect");
                Ok(())
            }
            ConnectionStatus::Connected => {
                let handle = self.require_handle("load_scenario")?;
                self.link
                    .load_scenario(&handle, reference)
                    .map_err(|e| SessionError::Scenario {
                        message: format!("failed to load {reference}: {e}"),
                    })?;
                self.scenario = reference.to_owned();
                info!(scenario = reference, "scenario loaded");
                Ok(())
            }
            ConnectionStatus::Connecting | ConnectionStatus::Disconnecting => {
                Err(SessionError::InvalidState {
                    operation: "load_scenario",
                    status: self.status,
                })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stepping and lights
    // -----------------------------------------------------------------------

    /// Advance the simulation one step, replacing the vehicle set.
    ///
    /// The step counter is incremented separately via
    /// [`mark_step_complete`](Self::mark_step_complete) once the whole
    /// tick pipeline has run.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidState`] unless Connected, or
    /// [`SessionError::Sim`] if the advance fails.
    pub fn advance_step(&mut self) -> Result<&[Vehicle], SessionError> {
        let handle = self.require_handle("advance_step")?;
        self.vehicles = self.link.advance(&handle)?;
        Ok(&self.vehicles)
    }

    /// Record that a tick completed all its effects.
    pub const fn mark_step_complete(&mut self) {
        self.step_count = self.step_count.saturating_add(1);
    }

    /// Apply a batch of light assignments as one atomic command.
    ///
    /// The batch is a single protocol exchange; the local light set is
    /// only updated after the engine acknowledges, so a failed command
    /// leaves the published lights untouched.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidState`] unless Connected, or
    /// [`SessionError::Sim`] if the command fails.
    pub fn apply_lights(&mut self, batch: &[LightCommand]) -> Result<(), SessionError> {
        if batch.is_empty() {
            return Ok(());
        }
        let handle = self.require_handle("apply_lights")?;
        self.link.set_lights(&handle, batch)?;

        for command in batch {
            if let Some(light) = self.lights.get_mut(&command.approach) {
                light.state = command.state;
                light.phase = phase_for(command.state);
            } else {
                // The four-light set is fixed at session start; an unknown
                // approach here means the set was cleared mid-command.
                warn!(approach = ?command.approach, "light command for unknown head");
            }
        }
        Ok(())
    }

    /// Set one light head directly (manual override).
    ///
    /// Always available while Connected; bypasses the optimizer for one
    /// tick and does not persist as an optimizer preference.
    ///
    /// # Errors
    ///
    /// Same as [`apply_lights`](Self::apply_lights).
    pub fn set_light(&mut self, approach: Approach, state: LightState) -> Result<(), SessionError> {
        self.apply_lights(&[LightCommand { approach, state }])
    }

    // -----------------------------------------------------------------------
    // Error state
    // -----------------------------------------------------------------------

    /// Record the last observed error.
    pub fn set_error(&mut self, error: LastError) {
        self.last_error = Some(error);
    }

    /// Clear the error state. Explicit only -- never automatic.
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current connection status.
    pub const fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Whether the session is connected.
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// The configured engine endpoint.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.config.host.clone(),
            port: self.config.port,
        }
    }

    /// The current scenario reference.
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// Steps completed since connect.
    pub const fn step_count(&self) -> u64 {
        self.step_count
    }

    /// The current vehicle set.
    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    /// The light heads in stable approach order (empty when disconnected).
    pub fn lights(&self) -> Vec<TrafficLight> {
        Approach::ALL
            .iter()
            .filter_map(|approach| self.lights.get(approach).copied())
            .collect()
    }

    /// The axis currently holding green, if exactly one axis does.
    ///
    /// Returns `None` while disconnected or when a manual override has
    /// left the heads in a mixed state.
    pub fn green_axis(&self) -> Option<Axis> {
        let axis_green = |axis: Axis| {
            axis.approaches().iter().all(|approach| {
                self.lights
                    .get(approach)
                    .is_some_and(|l| l.state == LightState::Green)
            })
        };
        match (axis_green(Axis::NorthSouth), axis_green(Axis::EastWest)) {
            (true, false) => Some(Axis::NorthSouth),
            (false, true) => Some(Axis::EastWest),
            _ => None,
        }
    }

    /// The last observed error, if any.
    pub const fn last_error(&self) -> Option<&LastError> {
        self.last_error.as_ref()
    }

    fn require_handle(&self, operation: &'static str) -> Result<SessionHandle, SessionError> {
        if self.status != ConnectionStatus::Connected {
            return Err(SessionError::InvalidState {
                operation,
                status: self.status,
            });
        }
        self.handle.ok_or(SessionError::InvalidState {
            operation,
            status: self.status,
        })
    }
}

/// The fixed four-light set at session start: opposing pairs in
/// complementary red/green, east-west holding green first.
fn default_lights() -> BTreeMap<Approach, TrafficLight> {
    let mut lights = BTreeMap::new();
    for approach in Approach::ALL {
        let (state, phase, duration_s) = match approach.axis() {
            Axis::NorthSouth => (LightState::Red, 0, 30),
            Axis::EastWest => (LightState::Green, 1, 45),
        };
        lights.insert(
            approach,
            TrafficLight {
                approach,
                state,
                phase,
                duration_s,
            },
        );
    }
    lights
}

/// Phase index for a terminal light state.
const fn phase_for(state: LightState) -> u32 {
    match state {
        LightState::Red => 0,
        LightState::Green => 1,
        LightState::Yellow => 2,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::link::StubLink;

    fn manager() -> SessionManager {
        SessionManager::new(Box::new(StubLink::new()), SimulationConfig::default())
    }

    #[test]
    fn connect_initializes_complementary_lights() {
        let mut session = manager();
        session.connect().unwrap();

        assert_eq!(session.status(), ConnectionStatus::Connected);
        let lights = session.lights();
        assert_eq!(lights.len(), 4);

        let state_of = |approach: Approach| {
            lights
                .iter()
                .find(|l| l.approach == approach)
                .map(|l| l.state)
                .unwrap()
        };
        assert_eq!(state_of(Approach::North), LightState::Red);
        assert_eq!(state_of(Approach::South), LightState::Red);
        assert_eq!(state_of(Approach::East), LightState::Green);
        assert_eq!(state_of(Approach::West), LightState::Green);
        assert_eq!(session.green_axis(), Some(Axis::EastWest));
    }

    #[test]
    fn connect_while_connected_is_a_connection_error() {
        let mut session = manager();
        session.connect().unwrap();
        let err = session.connect().unwrap_err();
        assert!(matches!(err, SessionError::Connection { .. }));
        // The session stays connected.
        assert!(session.is_connected());
    }

    #[test]
    fn connect_clears_previous_error() {
        let mut session = manager();
        session.set_error(LastError::new("previous failure"));
        session.connect().unwrap();
        assert!(session.last_error().is_none());
    }

    #[test]
    fn failed_connect_falls_back_to_disconnected() {
        let mut link = StubLink::new();
        link.fail_next_open();
        let mut session = SessionManager::new(Box::new(link), SimulationConfig::default());

        let err = session.connect().unwrap_err();
        assert!(matches!(err, SessionError::Connection { .. }));
        assert_eq!(session.status(), ConnectionStatus::Disconnected);

        // A retry succeeds.
        session.connect().unwrap();
        assert!(session.is_connected());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut session = manager();
        session.connect().unwrap();
        session.advance_step().unwrap();
        session.mark_step_complete();

        session.disconnect();
        let status_after_first = session.status();
        let steps_after_first = session.step_count();

        session.disconnect();
        assert_eq!(session.status(), status_after_first);
        assert_eq!(session.step_count(), steps_after_first);
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn disconnect_clears_step_state() {
        let mut session = manager();
        session.connect().unwrap();
        session.mark_step_complete();
        session.disconnect();

        assert_eq!(session.step_count(), 0);
        assert!(session.vehicles().is_empty());
        assert!(session.lights().is_empty());
        assert_eq!(session.green_axis(), None);
    }

    #[test]
    fn advance_replaces_vehicles_wholesale() {
        let mut link = StubLink::new();
        link.push_axis_counts(2, 1);
        link.push_axis_counts(0, 1);
        let mut session = SessionManager::new(Box::new(link), SimulationConfig::default());
        session.connect().unwrap();

        assert_eq!(session.advance_step().unwrap().len(), 3);
        assert_eq!(session.advance_step().unwrap().len(), 1);
    }

    #[test]
    fn advance_requires_connected() {
        let mut session = manager();
        let err = session.advance_step().unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
    }

    #[test]
    fn light_batch_requires_connected() {
        let mut session = manager();
        let err = session
            .set_light(Approach::North, LightState::Green)
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));
    }

    #[test]
    fn light_batch_updates_all_heads_together() {
        let mut session = manager();
        session.connect().unwrap();

        let batch = vec![
            LightCommand {
                approach: Approach::North,
                state: LightState::Green,
            },
            LightCommand {
                approach: Approach::South,
                state: LightState::Green,
            },
            LightCommand {
                approach: Approach::East,
                state: LightState::Red,
            },
            LightCommand {
                approach: Approach::West,
                state: LightState::Red,
            },
        ];
        session.apply_lights(&batch).unwrap();
        assert_eq!(session.green_axis(), Some(Axis::NorthSouth));
    }

    #[test]
    fn load_scenario_while_disconnected_stores_reference() {
        let mut session = manager();
        session.load_scenario("grid.sumocfg").unwrap();
        assert_eq!(session.scenario(), "grid.sumocfg");
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn load_scenario_while_connected_resolves_on_engine() {
        let mut session = manager();
        session.connect().unwrap();
        session.load_scenario("grid.sumocfg").unwrap();
        assert_eq!(session.scenario(), "grid.sumocfg");
        assert!(session.is_connected());
    }

    #[test]
    fn load_scenario_rejection_is_a_scenario_error() {
        let mut link = StubLink::new();
        link.fail_next_load();
        let mut session = SessionManager::new(Box::new(link), SimulationConfig::default());
        session.connect().unwrap();

        let err = session.load_scenario("missing.sumocfg").unwrap_err();
        assert!(matches!(err, SessionError::Scenario { .. }));
        // The previous reference is kept.
        assert_eq!(session.scenario(), "traffic.sumocfg");
    }

    #[test]
    fn empty_scenario_reference_is_rejected() {
        let mut session = manager();
        let err = session.load_scenario("  ").unwrap_err();
        assert!(matches!(err, SessionError::Scenario { .. }));
    }

    #[test]
    fn error_state_is_cleared_explicitly() {
        let mut session = manager();
        session.set_error(LastError::new("step failed"));
        assert!(session.last_error().is_some());
        session.clear_error();
        assert!(session.last_error().is_none());
    }
}
