//! TCP simulation link: JSON-lines control protocol over a socket.
//!
//! [`TcpSimulationLink`] implements the core [`SimulationLink`] trait
//! against a simulation engine listening on a TCP control port. Each
//! exchange is one newline-terminated JSON request followed by one
//! newline-terminated JSON response.
//!
//! # Wire Protocol
//!
//! - **Open:** `{"cmd":"open","scenario":...,"step_interval_ms":...}`
//! - **Step:** `{"cmd":"step"}` -> `{"ok":true,"vehicles":[...]}`
//! - **Lights:** `{"cmd":"set_lights","lights":[{"id":...,"state":...}]}`
//!   -- the whole batch travels in one message, so the engine applies it
//!   all-or-nothing.
//! - **Load:** `{"cmd":"load","scenario":...}`
//! - **Close:** `{"cmd":"close"}`
//!
//! # Timeouts
//!
//! Every operation is bounded: the connect uses the configured connect
//! timeout, and each request/response exchange uses socket read/write
//! timeouts. An expired timeout surfaces as the retryable
//! [`LinkError::Timeout`].

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use greenwave_core::link::{Endpoint, LightCommand, LinkError, SessionHandle, SimulationLink};
use greenwave_types::{LightState, Vehicle};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A request on the simulation control protocol.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum WireRequest<'a> {
    /// Open a session.
    Open {
        /// Scenario reference to start with.
        scenario: &'a str,
        /// Real-time milliseconds per simulation step.
        step_interval_ms: u64,
    },
    /// Advance one step.
    Step,
    /// Apply a light batch atomically.
    SetLights {
        /// All heads to set in this exchange.
        lights: Vec<WireLight>,
    },
    /// Resolve a scenario reference.
    Load {
        /// Scenario reference to resolve.
        scenario: &'a str,
    },
    /// Close the session.
    Close,
}

/// One light head assignment on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct WireLight {
    /// Wire identifier of the head (e.g. `tl_north`).
    id: String,
    /// The intended terminal state.
    state: LightState,
}

/// A response on the simulation control protocol.
#[derive(Debug, Deserialize)]
struct WireResponse {
    /// Whether the command was accepted.
    ok: bool,
    /// Rejection message when `ok` is false.
    #[serde(default)]
    error: Option<String>,
    /// Engine-side session identifier (informational).
    #[serde(default)]
    session: Option<String>,
    /// Vehicle set for a `step` response.
    #[serde(default)]
    vehicles: Option<Vec<Vehicle>>,
}

/// One live TCP connection to the engine.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    handle: SessionHandle,
}

/// TCP implementation of the simulation control protocol.
pub struct TcpSimulationLink {
    connect_timeout: Duration,
    command_timeout: Duration,
    conn: Option<Connection>,
}

impl TcpSimulationLink {
    /// Create an unconnected link with the given timeouts.
    pub const fn new(connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            command_timeout,
            conn: None,
        }
    }

    const fn command_timeout_ms(&self) -> u64 {
        self.command_timeout.as_millis() as u64
    }

    /// Map a socket I/O error to a link error.
    fn map_io(&self, e: &std::io::Error, operation: &'static str) -> LinkError {
        match e.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => LinkError::Timeout {
                operation,
                timeout_ms: self.command_timeout_ms(),
            },
            _ => LinkError::Connection {
                message: format!("{operation} failed: {e}"),
            },
        }
    }

    /// Send one request and read one response line.
    fn request(
        &mut self,
        request: &WireRequest<'_>,
        operation: &'static str,
    ) -> Result<WireResponse, LinkError> {
        let mut payload = serde_json::to_vec(request).map_err(|e| LinkError::Protocol {
            message: format!("failed to encode {operation} request: {e}"),
        })?;
        payload.push(b'\n');

        let exchange = {
            let Some(conn) = self.conn.as_mut() else {
                return Err(LinkError::Closed);
            };

            conn.writer.write_all(&payload).and_then(|()| {
                let mut line = String::new();
                conn.reader.read_line(&mut line).map(|read| (read, line))
            })
        };

        let (read, line) = match exchange {
            Ok(pair) => pair,
            Err(e) => return Err(self.map_io(&e, operation)),
        };

        if read == 0 {
            // The engine closed the connection.
            self.conn = None;
            return Err(LinkError::Closed);
        }

        let response: WireResponse =
            serde_json::from_str(line.trim()).map_err(|e| LinkError::Protocol {
                message: format!("malformed {operation} response: {e}"),
            })?;

        if response.ok {
            Ok(response)
        } else {
            Err(LinkError::Rejected {
                message: response
                    .error
                    .unwrap_or_else(|| format!("{operation} rejected without a message")),
            })
        }
    }

    fn check_handle(&self, handle: &SessionHandle) -> Result<(), LinkError> {
        match self.conn.as_ref() {
            Some(conn) if conn.handle == *handle => Ok(()),
            _ => Err(LinkError::Closed),
        }
    }
}

impl SimulationLink for TcpSimulationLink {
    fn open(
        &mut self,
        endpoint: &Endpoint,
        scenario: &str,
        step_interval_ms: u64,
    ) -> Result<SessionHandle, LinkError> {
        let addr: SocketAddr = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|e| LinkError::Connection {
                message: format!("cannot resolve {endpoint}: {e}"),
            })?
            .next()
            .ok_or_else(|| LinkError::Connection {
                message: format!("no address for {endpoint}"),
            })?;

        let stream =
            TcpStream::connect_timeout(&addr, self.connect_timeout).map_err(|e| {
                if e.kind() == std::io::ErrorKind::TimedOut {
                    LinkError::Timeout {
                        operation: "open",
                        timeout_ms: self.connect_timeout.as_millis() as u64,
                    }
                } else {
                    LinkError::Connection {
                        message: format!("connect to {endpoint} failed: {e}"),
                    }
                }
            })?;

        stream
            .set_read_timeout(Some(self.command_timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.command_timeout)))
            .map_err(|e| LinkError::Connection {
                message: format!("failed to configure socket timeouts: {e}"),
            })?;

        let reader_stream = stream.try_clone().map_err(|e| LinkError::Connection {
            message: format!("failed to clone socket: {e}"),
        })?;

        let handle = SessionHandle::new();
        self.conn = Some(Connection {
            reader: BufReader::new(reader_stream),
            writer: stream,
            handle,
        });

        let response = self
            .request(
                &WireRequest::Open {
                    scenario,
                    step_interval_ms,
                },
                "open",
            )
            .inspect_err(|_| {
                self.conn = None;
            })?;

        debug!(
            engine_session = response.session.as_deref().unwrap_or("-"),
            "simulation session opened"
        );
        Ok(handle)
    }

    fn advance(&mut self, handle: &SessionHandle) -> Result<Vec<Vehicle>, LinkError> {
        self.check_handle(handle)?;
        let response = self.request(&WireRequest::Step, "step")?;
        response.vehicles.ok_or_else(|| LinkError::Protocol {
            message: String::from("step response carried no vehicle set"),
        })
    }

    fn set_lights(
        &mut self,
        handle: &SessionHandle,
        batch: &[LightCommand],
    ) -> Result<(), LinkError> {
        self.check_handle(handle)?;
        let lights = batch
            .iter()
            .map(|command| WireLight {
                id: command.approach.light_id().to_owned(),
                state: command.state,
            })
            .collect();
        self.request(&WireRequest::SetLights { lights }, "set_lights")?;
        Ok(())
    }

    fn load_scenario(
        &mut self,
        handle: &SessionHandle,
        reference: &str,
    ) -> Result<(), LinkError> {
        self.check_handle(handle)?;
        self.request(&WireRequest::Load { scenario: reference }, "load")?;
        Ok(())
    }

    fn close(&mut self, handle: SessionHandle) {
        if self.check_handle(&handle).is_err() {
            return;
        }
        // Best-effort close notification; the socket drop tears the
        // connection down either way.
        if let Err(e) = self.request(&WireRequest::Close, "close") {
            warn!(error = %e, "close notification failed");
        }
        if let Some(conn) = self.conn.take() {
            let _ = conn.writer.shutdown(std::net::Shutdown::Both);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::TcpListener;

    use greenwave_types::Approach;

    use super::*;

    /// Serve scripted response lines on a fresh port, one per request
    /// line, then hold the connection open briefly.
    fn spawn_server(responses: Vec<&'static str>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            for response in responses {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    return;
                }
                writer.write_all(response.as_bytes()).unwrap();
                writer.write_all(b"\n").unwrap();
            }
            // Keep the socket open so a pending client read times out
            // instead of seeing EOF.
            std::thread::sleep(Duration::from_millis(500));
        });
        addr
    }

    fn link() -> TcpSimulationLink {
        TcpSimulationLink::new(Duration::from_millis(1_000), Duration::from_millis(200))
    }

    fn endpoint(addr: SocketAddr) -> Endpoint {
        Endpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }

    #[test]
    fn open_step_and_lights_round_trip() {
        let addr = spawn_server(vec![
            r#"{"ok":true,"session":"engine-1"}"#,
            r#"{"ok":true,"vehicles":[{"id":"v0","kind":"car","speed":5.5,"position":{"x":1.0,"y":2.0},"lane":"north_in_0","route":["e1","e2"]}]}"#,
            r#"{"ok":true}"#,
        ]);

        let mut link = link();
        let handle = link.open(&endpoint(addr), "traffic.sumocfg", 1_000).unwrap();

        let vehicles = link.advance(&handle).unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles.first().map(|v| v.lane.as_str()), Some("north_in_0"));

        link.set_lights(
            &handle,
            &[LightCommand {
                approach: Approach::North,
                state: LightState::Green,
            }],
        )
        .unwrap();
    }

    #[test]
    fn engine_rejection_surfaces_as_rejected() {
        let addr = spawn_server(vec![
            r#"{"ok":true}"#,
            r#"{"ok":false,"error":"unknown scenario"}"#,
        ]);

        let mut link = link();
        let handle = link.open(&endpoint(addr), "traffic.sumocfg", 1_000).unwrap();
        let err = link.load_scenario(&handle, "missing.sumocfg").unwrap_err();
        assert!(matches!(err, LinkError::Rejected { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn silent_engine_times_out() {
        // The server answers the open, then goes quiet while keeping the
        // socket alive.
        let addr = spawn_server(vec![r#"{"ok":true}"#]);

        let mut link = link();
        let handle = link.open(&endpoint(addr), "traffic.sumocfg", 1_000).unwrap();
        let err = link.advance(&handle).unwrap_err();
        assert!(matches!(err, LinkError::Timeout { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn unreachable_engine_is_a_connection_error() {
        // Bind a port, then free it so the connect is refused.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let mut link = link();
        let err = link.open(&endpoint(addr), "traffic.sumocfg", 1_000).unwrap_err();
        assert!(matches!(err, LinkError::Connection { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn malformed_response_is_a_protocol_error() {
        let addr = spawn_server(vec![r#"{"ok":true}"#, "not json at all"]);

        let mut link = link();
        let handle = link.open(&endpoint(addr), "traffic.sumocfg", 1_000).unwrap();
        let err = link.advance(&handle).unwrap_err();
        assert!(matches!(err, LinkError::Protocol { .. }));
    }

    #[test]
    fn commands_without_a_session_are_closed() {
        let mut link = link();
        let stale = SessionHandle::new();
        assert!(matches!(link.advance(&stale), Err(LinkError::Closed)));
    }
}
