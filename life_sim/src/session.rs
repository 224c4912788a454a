//! Per-connection update loop.
//!
//! A session walks `AwaitingConfigAck -> AwaitingFirstViewport -> Streaming
//! -> Closed`. While streaming, every receive is bounded by the step period:
//! a timeout advances the current viewport autonomously, a valid viewport
//! change is acknowledged and stepped immediately.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use life_proto::{encode_message, ClientRequest, RequestError, ServerMessage, Viewport};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::GameConfig;
use crate::metrics::ServerMetrics;
use crate::region::Margin;
use crate::shared::SharedWorld;
use crate::viewport::{normalize, WorldBounds};

/// Result of a timeout-bounded receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message(String),
    Timeout,
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer went away cleanly.
    #[error("peer disconnected")]
    Disconnected,
    #[error("transport i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// A bidirectional text-frame connection.
pub trait Transport {
    fn send(&mut self, frame: &str) -> Result<(), TransportError>;
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Inbound, TransportError>;
    fn close(&mut self) -> Result<(), TransportError>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to encode {kind} message: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Protocol state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    AwaitingConfigAck,
    AwaitingFirstViewport,
    Streaming(Viewport),
    Closed,
}

/// Settings a session needs from the process configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub bounds: WorldBounds,
    pub max_viewport_cells: u64,
    pub step_period: Duration,
    pub initial_timeout: Duration,
    pub margin: Margin,
    pub config_message: ServerMessage,
}

impl SessionSettings {
    pub fn from_config(config: &GameConfig) -> Self {
        Self {
            bounds: config.bounds(),
            max_viewport_cells: config.max_viewport_cells,
            step_period: config.step_period(),
            initial_timeout: config.initial_timeout(),
            margin: Margin::MOORE,
            config_message: ServerMessage::Config(config.client_state()),
        }
    }
}

pub struct Session<T: Transport> {
    transport: T,
    world: SharedWorld,
    settings: Arc<SessionSettings>,
    metrics: Arc<ServerMetrics>,
    state: SessionState,
}

impl<T: Transport> Session<T> {
    pub fn new(
        transport: T,
        world: SharedWorld,
        settings: Arc<SessionSettings>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        Self {
            transport,
            world,
            settings,
            metrics,
            state: SessionState::AwaitingConfigAck,
        }
    }

    /// Drive the session until the peer leaves or the transport fails.
    ///
    /// A clean disconnect returns `Ok`. Transport failures close the
    /// connection (best effort) and are returned to the caller.
    pub fn run(mut self) -> Result<(), SessionError> {
        let result = self.drive();
        self.state = SessionState::Closed;
        match result {
            Ok(()) | Err(SessionError::Transport(TransportError::Disconnected)) => Ok(()),
            Err(err) => {
                if let Err(close_err) = self.transport.close() {
                    debug!(target: "life_sim::session", error = %close_err, "session.close_failed");
                }
                Err(err)
            }
        }
    }

    fn drive(&mut self) -> Result<(), SessionError> {
        loop {
            self.state = match self.state {
                SessionState::AwaitingConfigAck => {
                    let settings = Arc::clone(&self.settings);
                    self.send(&settings.config_message)?;
                    SessionState::AwaitingFirstViewport
                }
                SessionState::AwaitingFirstViewport => match self.await_first_viewport()? {
                    Some(viewport) => SessionState::Streaming(viewport),
                    None => SessionState::Closed,
                },
                SessionState::Streaming(viewport) => SessionState::Streaming(self.stream(viewport)?),
                SessionState::Closed => return Ok(()),
            };
        }
    }

    /// Returns `None` when the setup window expired and the connection was closed.
    fn await_first_viewport(&mut self) -> Result<Option<Viewport>, SessionError> {
        loop {
            let raw = match self.transport.recv_timeout(self.settings.initial_timeout)? {
                Inbound::Message(raw) => raw,
                Inbound::Timeout => {
                    debug!(target: "life_sim::session", "session.initial_viewport_timeout");
                    self.send(&ServerMessage::error("timeout waiting for initial viewport"))?;
                    self.transport.close()?;
                    return Ok(None);
                }
            };

            let payload = match ClientRequest::parse(&raw) {
                Ok(ClientRequest::Viewport(payload)) => payload,
                Err(RequestError::InvalidJson) => {
                    self.reject("invalid json")?;
                    continue;
                }
                Err(_) => {
                    self.reject("expected first action 'viewport'")?;
                    continue;
                }
            };

            match normalize(&payload, self.settings.bounds, self.settings.max_viewport_cells) {
                Ok(viewport) => {
                    debug!(target: "life_sim::session", ?viewport, "session.viewport_accepted");
                    self.send(&ServerMessage::ok("viewport accepted", viewport))?;
                    return Ok(Some(viewport));
                }
                Err(err) => self.reject(&err.to_string())?,
            }
        }
    }

    /// One streaming iteration. Returns the viewport in force afterwards.
    fn stream(&mut self, current: Viewport) -> Result<Viewport, SessionError> {
        let raw = match self.transport.recv_timeout(self.settings.step_period)? {
            Inbound::Timeout => {
                self.step_and_push(current)?;
                return Ok(current);
            }
            Inbound::Message(raw) => raw,
        };

        let payload = match ClientRequest::parse(&raw) {
            Ok(ClientRequest::Viewport(payload)) => payload,
            Err(err) => {
                self.reject(&err.to_string())?;
                return Ok(current);
            }
        };

        match normalize(&payload, self.settings.bounds, self.settings.max_viewport_cells) {
            Ok(viewport) => {
                debug!(target: "life_sim::session", ?viewport, "session.viewport_updated");
                self.send(&ServerMessage::ok("viewport updated", viewport))?;
                self.step_and_push(viewport)?;
                Ok(viewport)
            }
            Err(err) => {
                self.reject(&err.to_string())?;
                Ok(current)
            }
        }
    }

    fn step_and_push(&mut self, viewport: Viewport) -> Result<(), SessionError> {
        let visible = self.world.step(&viewport, self.settings.margin);
        self.metrics.record_step(viewport.area());
        trace!(target: "life_sim::session", ?viewport, "session.stepped");
        self.send(&ServerMessage::Update {
            viewport,
            visible: visible.to_rows(),
        })
    }

    fn reject(&mut self, message: &str) -> Result<(), SessionError> {
        self.metrics.protocol_error();
        debug!(target: "life_sim::session", reason = message, "session.request_rejected");
        self.send(&ServerMessage::error(message))
    }

    fn send(&mut self, message: &ServerMessage) -> Result<(), SessionError> {
        let frame = encode_message(message).map_err(|source| SessionError::Encode {
            kind: message.kind(),
            source,
        })?;
        self.transport.send(&frame).map_err(|err| {
            if !matches!(err, TransportError::Disconnected) {
                warn!(target: "life_sim::session", kind = message.kind(), error = %err, "session.send_failed");
            }
            SessionError::from(err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Cell, EdgeMode, World};
    use life_proto::decode_message;
    use std::collections::VecDeque;

    /// Scripted transport: replays inbound events, records everything sent.
    #[derive(Default)]
    struct ScriptedTransport {
        inbound: VecDeque<Result<Inbound, TransportError>>,
        sent: Vec<ServerMessage>,
        timeouts: Vec<Duration>,
        fail_send_after: Option<usize>,
        closed: bool,
    }

    impl ScriptedTransport {
        fn script(events: Vec<Result<Inbound, TransportError>>) -> Self {
            Self {
                inbound: events.into(),
                ..Default::default()
            }
        }
    }

    impl Transport for &mut ScriptedTransport {
        fn send(&mut self, frame: &str) -> Result<(), TransportError> {
            if self.fail_send_after == Some(self.sent.len()) {
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "broken pipe",
                )));
            }
            self.sent.push(decode_message(frame).unwrap());
            Ok(())
        }

        fn recv_timeout(&mut self, timeout: Duration) -> Result<Inbound, TransportError> {
            self.timeouts.push(timeout);
            self.inbound
                .pop_front()
                .unwrap_or(Err(TransportError::Disconnected))
        }

        fn close(&mut self) -> Result<(), TransportError> {
            self.closed = true;
            Ok(())
        }
    }

    fn msg(text: &str) -> Result<Inbound, TransportError> {
        Ok(Inbound::Message(text.to_string()))
    }

    fn tick() -> Result<Inbound, TransportError> {
        Ok(Inbound::Timeout)
    }

    fn settings() -> Arc<SessionSettings> {
        let config = GameConfig {
            rows: 6,
            cols: 8,
            max_viewport_cells: 40,
            ..GameConfig::default()
        };
        Arc::new(SessionSettings::from_config(&config))
    }

    fn blinker_world() -> SharedWorld {
        let mut world = World::new(6, 8, EdgeMode::Wrap);
        for r in 1..=3 {
            world.set(r, 2, Cell::Alive);
        }
        SharedWorld::new(world)
    }

    fn run(transport: &mut ScriptedTransport, world: SharedWorld) -> Result<(), SessionError> {
        Session::new(transport, world, settings(), Arc::new(ServerMetrics::default())).run()
    }

    fn kinds(sent: &[ServerMessage]) -> Vec<&'static str> {
        sent.iter().map(ServerMessage::kind).collect()
    }

    const FIRST: &str = r#"{"action":"viewport","viewport":{"x":0,"y":0,"rows":5,"cols":5}}"#;

    #[test]
    fn config_then_ok_then_heartbeat_updates() {
        let mut transport = ScriptedTransport::script(vec![msg(FIRST), tick(), tick()]);
        run(&mut transport, blinker_world()).unwrap();

        assert_eq!(kinds(&transport.sent), ["config", "ok", "update", "update"]);
        assert!(matches!(
            &transport.sent[0],
            ServerMessage::Config(state) if state.rows == 6 && state.cols == 8
        ));
        let ServerMessage::Update { viewport, visible } = &transport.sent[2] else {
            panic!("expected update");
        };
        assert_eq!(*viewport, Viewport::new(0, 0, 5, 5));
        assert_eq!(visible[2], vec![0, 1, 1, 1, 0]);
        let ServerMessage::Update { visible, .. } = &transport.sent[3] else {
            panic!("expected update");
        };
        assert_eq!(visible[1], vec![0, 0, 1, 0, 0]);
        assert!(!transport.closed);
    }

    #[test]
    fn waits_use_setup_timeout_then_step_period() {
        let mut transport = ScriptedTransport::script(vec![msg(FIRST), tick()]);
        run(&mut transport, blinker_world()).unwrap();
        assert_eq!(
            transport.timeouts,
            [
                Duration::from_secs(15),
                Duration::from_millis(200),
                Duration::from_millis(200)
            ]
        );
    }

    #[test]
    fn first_message_errors_reprompt() {
        let mut transport = ScriptedTransport::script(vec![
            msg("not json"),
            msg(r#"{"action":"pause"}"#),
            msg(r#"{"action":"viewport","viewport":{"rows":0}}"#),
            msg(FIRST),
        ]);
        run(&mut transport, blinker_world()).unwrap();

        assert_eq!(kinds(&transport.sent), ["config", "error", "error", "error", "ok"]);
        let messages: Vec<_> = transport.sent[1..4]
            .iter()
            .map(|m| match m {
                ServerMessage::Error { message } => message.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(
            messages,
            [
                "invalid json",
                "expected first action 'viewport'",
                "Viewport rows/cols must be > 0"
            ]
        );
    }

    #[test]
    fn setup_timeout_reports_and_closes() {
        let mut transport = ScriptedTransport::script(vec![tick(), msg(FIRST)]);
        run(&mut transport, blinker_world()).unwrap();
        assert_eq!(kinds(&transport.sent), ["config", "error"]);
        assert!(transport.closed);
        assert_eq!(transport.inbound.len(), 1);
    }

    #[test]
    fn viewport_change_is_acknowledged_and_stepped_immediately() {
        let mut transport = ScriptedTransport::script(vec![
            msg(FIRST),
            msg(r#"{"action":"viewport","viewport":{"x":-1,"y":7,"rows":2,"cols":3}}"#),
            tick(),
        ]);
        run(&mut transport, blinker_world()).unwrap();

        assert_eq!(
            kinds(&transport.sent),
            ["config", "ok", "ok", "update", "update"]
        );
        let moved = Viewport::new(7, 1, 2, 3);
        assert_eq!(transport.sent[2], ServerMessage::ok("viewport updated", moved));
        for update in &transport.sent[3..] {
            let ServerMessage::Update { viewport, visible } = update else {
                panic!("expected update");
            };
            assert_eq!(*viewport, moved);
            assert_eq!(visible.len(), 2);
            assert!(visible.iter().all(|row| row.len() == 3));
        }
    }

    #[test]
    fn rejected_requests_keep_the_current_viewport() {
        let mut transport = ScriptedTransport::script(vec![
            msg(FIRST),
            msg("{"),
            msg(r#"{"viewport":{}}"#),
            msg(r#"{"action":"zoom"}"#),
            msg(r#"{"action":"viewport","viewport":{"rows":7,"cols":7}}"#),
            tick(),
        ]);
        let world = blinker_world();
        run(&mut transport, world).unwrap();

        assert_eq!(
            kinds(&transport.sent),
            ["config", "ok", "error", "error", "error", "error", "update"]
        );
        assert_eq!(
            transport.sent[2..6].to_vec(),
            vec![
                ServerMessage::error("invalid json"),
                ServerMessage::error("missing action"),
                ServerMessage::error("unsupported action"),
                ServerMessage::error("Requested viewport area too large"),
            ]
        );
        assert!(matches!(
            transport.sent[6],
            ServerMessage::Update { viewport, .. } if viewport == Viewport::new(0, 0, 5, 5)
        ));
    }

    #[test]
    fn each_idle_period_yields_exactly_one_update() {
        let mut events = vec![msg(FIRST)];
        events.extend((0..5).map(|_| tick()));
        let mut transport = ScriptedTransport::script(events);
        run(&mut transport, blinker_world()).unwrap();
        assert_eq!(kinds(&transport.sent).iter().filter(|k| **k == "update").count(), 5);
    }

    #[test]
    fn send_failure_closes_and_propagates() {
        let mut transport = ScriptedTransport::script(vec![msg(FIRST), tick()]);
        transport.fail_send_after = Some(2);
        let err = run(&mut transport, blinker_world()).unwrap_err();
        assert!(matches!(err, SessionError::Transport(TransportError::Io(_))));
        assert!(transport.closed);
        assert_eq!(kinds(&transport.sent), ["config", "ok"]);
    }

    #[test]
    fn config_send_failure_terminates_without_reading() {
        let mut transport = ScriptedTransport::script(vec![msg(FIRST)]);
        transport.fail_send_after = Some(0);
        assert!(run(&mut transport, blinker_world()).is_err());
        assert!(transport.closed);
        assert!(transport.timeouts.is_empty());
    }

    #[test]
    fn disconnect_during_setup_is_clean() {
        let mut transport = ScriptedTransport::script(vec![]);
        run(&mut transport, blinker_world()).unwrap();
        assert_eq!(kinds(&transport.sent), ["config"]);
        assert!(!transport.closed);
    }
}
