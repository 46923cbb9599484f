//! Request/response protocol between a control surface and the engine.
//!
//! [`ControlBridge`] serves typed [`Request`]s on the control side.
//! [`RenderPort`] is the matching host callback on the render side: it renders
//! silence until the bridge hands it a [`Renderer`] on initialization.
//! The two halves talk over a one-slot queue, so neither ever blocks.

use crate::bank::BankSummary;
use crate::config::EngineConfig;
use crate::engine::{EngineStateSnapshot, Renderer, SynthesisCore};
use crate::error::{EngineError, InitError};
use rtrb::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Velocity used when a note-on request does not carry one.
pub const DEFAULT_VELOCITY: u8 = 100;

/// A control request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Builds the engine. Must be the first request.
    Initialize {
        #[serde(default)]
        config: EngineConfig,
    },
    /// Decodes and registers a SoundFont.
    AddSoundfont { name: String, data: Vec<u8> },
    /// Selects a preset by id.
    SetPreset { bank_id: String, preset_id: String },
    /// Selects a preset by MIDI bank and program numbers.
    SetPresetByNumbers {
        bank_id: String,
        bank: u16,
        program: u8,
    },
    NoteOn {
        key: u8,
        #[serde(default = "default_velocity")]
        velocity: u8,
    },
    NoteOff { key: u8 },
    SetGain { gain: f32 },
    AllNotesOff,
    GetState,
}

fn default_velocity() -> u8 {
    DEFAULT_VELOCITY
}

/// Reply to a [`Request`]. Each request either fully succeeds or returns
/// `Error` with no state changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok,
    BankAdded { bank: BankSummary },
    State { state: EngineStateSnapshot },
    Error { error: BridgeError },
}

/// Error category carried in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Decode,
    NotFound,
    Init,
    QueueFull,
    InvalidRequest,
}

/// Serializable error description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<EngineError> for BridgeError {
    fn from(err: EngineError) -> Self {
        let kind = match &err {
            EngineError::Decode(_) => ErrorKind::Decode,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Init(_) => ErrorKind::Init,
            EngineError::QueueFull(_) => ErrorKind::QueueFull,
            EngineError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl From<EngineError> for Response {
    fn from(err: EngineError) -> Self {
        Response::Error { error: err.into() }
    }
}

/// Control-side request handler.
pub struct ControlBridge {
    core: Option<SynthesisCore>,
    handoff: Producer<Renderer>,
}

/// Render-side host callback.
pub struct RenderPort {
    renderer: Option<Renderer>,
    handoff: Consumer<Renderer>,
}

impl ControlBridge {
    /// Creates an uninitialized bridge and its render port.
    pub fn new() -> (Self, RenderPort) {
        let (producer, consumer) = RingBuffer::new(1);
        (
            Self {
                core: None,
                handoff: producer,
            },
            RenderPort {
                renderer: None,
                handoff: consumer,
            },
        )
    }

    /// Returns true once `initialize` has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.core.is_some()
    }

    /// The engine's control half, if initialized.
    pub fn core(&self) -> Option<&SynthesisCore> {
        self.core.as_ref()
    }

    /// Serves one request.
    pub fn handle(&mut self, request: Request) -> Response {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(err) => {
                warn!("Request failed: {}", err);
                err.into()
            }
        }
    }

    /// Initializes from raw engine bytes: a JSON engine configuration in which
    /// missing fields take their defaults and empty input means all defaults.
    pub fn initialize_from_bytes(&mut self, engine: &[u8]) -> Response {
        let result = EngineConfig::from_json(engine)
            .map_err(EngineError::from)
            .and_then(|config| self.initialize(&config));
        match result {
            Ok(()) => Response::Ok,
            Err(err) => {
                warn!("Initialize failed: {}", err);
                err.into()
            }
        }
    }

    /// Serves one JSON-encoded request and returns the JSON-encoded response.
    ///
    /// Requests that do not parse are answered with an `invalid_request` error.
    pub fn handle_json(&mut self, line: &str) -> String {
        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request),
            Err(err) => {
                warn!("Malformed request: {}", err);
                EngineError::InvalidRequest(err.to_string()).into()
            }
        };
        serde_json::to_string(&response).unwrap_or_else(|err| {
            format!(
                r#"{{"type":"error","error":{{"kind":"invalid_request","message":"{}"}}}}"#,
                err.to_string().replace('"', "'")
            )
        })
    }

    fn dispatch(&mut self, request: Request) -> Result<Response, EngineError> {
        let request = match request {
            Request::Initialize { config } => {
                return self.initialize(&config).map(|()| Response::Ok);
            }
            other => other,
        };

        let core = self.core.as_mut().ok_or(InitError::NotInitialized)?;

        let response = match request {
            Request::Initialize { .. } => return Err(InitError::AlreadyInitialized.into()),
            Request::AddSoundfont { name, data } => Response::BankAdded {
                bank: core.load_bank(&name, &data)?,
            },
            Request::SetPreset { bank_id, preset_id } => {
                core.select_preset(&bank_id, &preset_id)?;
                Response::Ok
            }
            Request::SetPresetByNumbers {
                bank_id,
                bank,
                program,
            } => {
                check_midi("program", program)?;
                core.select_preset_by_numbers(&bank_id, bank, program)?;
                Response::Ok
            }
            Request::NoteOn { key, velocity } => {
                check_midi("key", key)?;
                check_midi("velocity", velocity)?;
                core.note_on(key, velocity);
                Response::Ok
            }
            Request::NoteOff { key } => {
                check_midi("key", key)?;
                core.note_off(key);
                Response::Ok
            }
            Request::SetGain { gain } => {
                if !gain.is_finite() {
                    return Err(EngineError::InvalidRequest(format!(
                        "gain must be a finite number, got {}",
                        gain
                    )));
                }
                core.set_gain(gain)?;
                Response::Ok
            }
            Request::AllNotesOff => {
                core.all_notes_off();
                Response::Ok
            }
            Request::GetState => Response::State {
                state: core.snapshot_state().as_ref().clone(),
            },
        };
        Ok(response)
    }

    fn initialize(&mut self, config: &EngineConfig) -> Result<(), EngineError> {
        if self.core.is_some() {
            return Err(InitError::AlreadyInitialized.into());
        }
        let (core, renderer) = SynthesisCore::new(config)?;
        if self.handoff.push(renderer).is_err() {
            return Err(InitError::AlreadyInitialized.into());
        }
        self.core = Some(core);
        Ok(())
    }
}

impl RenderPort {
    /// Renders one quantum into `outputs`, which must hold at least a left
    /// and a right channel of equal length.
    ///
    /// Returns false when fewer than two channels are supplied, which tells
    /// the host to tear this port down. Otherwise returns true, rendering
    /// silence until the engine is initialized. Channels past the second are
    /// zeroed.
    pub fn process(&mut self, outputs: &mut [&mut [f32]]) -> bool {
        if outputs.len() < 2 {
            return false;
        }
        if self.renderer.is_none() {
            self.renderer = self.handoff.pop().ok();
        }

        let (stereo, rest) = outputs.split_at_mut(2);
        for extra in rest.iter_mut() {
            extra.fill(0.0);
        }
        let (left, right) = stereo.split_at_mut(1);
        match self.renderer.as_mut() {
            Some(renderer) => renderer.render(left[0], right[0]),
            None => {
                left[0].fill(0.0);
                right[0].fill(0.0);
                true
            }
        }
    }

    /// Returns true once a renderer has been attached.
    pub fn is_attached(&self) -> bool {
        self.renderer.is_some()
    }
}

fn check_midi(what: &str, value: u8) -> Result<(), EngineError> {
    if value > 127 {
        return Err(EngineError::InvalidRequest(format!(
            "{} {} outside 0-127",
            what, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::builtin::SoundFontWriter;

    fn process(port: &mut RenderPort) -> Vec<f32> {
        let mut left = vec![1.0; 128];
        let mut right = vec![1.0; 128];
        let mut outputs: [&mut [f32]; 2] = [&mut left, &mut right];
        assert!(port.process(&mut outputs));
        left
    }

    fn ready() -> (ControlBridge, RenderPort) {
        let (mut bridge, port) = ControlBridge::new();
        assert_eq!(
            bridge.handle(Request::Initialize {
                config: EngineConfig::default()
            }),
            Response::Ok
        );
        (bridge, port)
    }

    fn error_kind(response: Response) -> ErrorKind {
        match response {
            Response::Error { error } => error.kind,
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_requests_before_initialize_fail() {
        let (mut bridge, mut port) = ControlBridge::new();
        assert_eq!(error_kind(bridge.handle(Request::GetState)), ErrorKind::Init);
        assert_eq!(
            error_kind(bridge.handle(Request::NoteOn {
                key: 60,
                velocity: 100
            })),
            ErrorKind::Init
        );
        assert!(!bridge.is_initialized());

        // The port plays silence meanwhile.
        assert!(process(&mut port).iter().all(|s| *s == 0.0));
        assert!(!port.is_attached());
    }

    #[test]
    fn test_double_initialize_fails() {
        let (mut bridge, _port) = ready();
        let response = bridge.handle(Request::Initialize {
            config: EngineConfig::default(),
        });
        match response {
            Response::Error { error } => {
                assert_eq!(error.kind, ErrorKind::Init);
                assert_eq!(error.message, "engine is already initialized");
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_config_leaves_bridge_uninitialized() {
        let (mut bridge, _port) = ControlBridge::new();
        let config = EngineConfig {
            sample_rate: 10,
            ..EngineConfig::default()
        };
        assert_eq!(
            error_kind(bridge.handle(Request::Initialize { config })),
            ErrorKind::Init
        );
        assert!(!bridge.is_initialized());
        assert_eq!(
            bridge.handle(Request::Initialize {
                config: EngineConfig::default()
            }),
            Response::Ok
        );
    }

    #[test]
    fn test_initialize_from_bytes() {
        let (mut bridge, _port) = ControlBridge::new();
        assert_eq!(
            error_kind(bridge.initialize_from_bytes(b"{\"sample_rate\": 10}")),
            ErrorKind::Init
        );
        assert_eq!(
            error_kind(bridge.initialize_from_bytes(b"\x00\x01")),
            ErrorKind::Init
        );
        assert!(!bridge.is_initialized());

        assert_eq!(
            bridge.initialize_from_bytes(br#"{"sample_rate": 44100}"#),
            Response::Ok
        );
        assert_eq!(bridge.core().map(|c| c.sample_rate()), Some(44100));
        assert_eq!(error_kind(bridge.initialize_from_bytes(b"")), ErrorKind::Init);
    }

    #[test]
    fn test_note_through_port() {
        let (mut bridge, mut port) = ready();
        bridge.handle(Request::NoteOn {
            key: 72,
            velocity: 100,
        });
        assert!(process(&mut port).iter().any(|s| *s != 0.0));
        assert!(port.is_attached());
    }

    #[test]
    fn test_port_needs_two_channels() {
        let (_bridge, mut port) = ready();
        let mut mono = vec![0.0; 128];
        let mut outputs: [&mut [f32]; 1] = [&mut mono];
        assert!(!port.process(&mut outputs));
        assert!(!port.process(&mut []));
    }

    #[test]
    fn test_add_and_select() {
        let (mut bridge, mut port) = ready();
        let data = SoundFontWriter::new("Keys").preset("Organ", 0, 19).build();
        let bank = match bridge.handle(Request::AddSoundfont {
            name: "keys.sf2".to_string(),
            data,
        }) {
            Response::BankAdded { bank } => bank,
            other => panic!("expected bank, got {:?}", other),
        };
        assert_eq!(bank.id, "keys.sf2");

        let response = bridge.handle(Request::SetPreset {
            bank_id: bank.id.clone(),
            preset_id: bank.presets[0].id.clone(),
        });
        assert_eq!(response, Response::Ok);
        process(&mut port);

        match bridge.handle(Request::GetState) {
            Response::State { state } => {
                assert_eq!(state.current_bank.as_deref(), Some("keys.sf2"));
                assert_eq!(state.banks.len(), 2);
            }
            other => panic!("expected state, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_errors() {
        let (mut bridge, _port) = ready();
        assert_eq!(
            error_kind(bridge.handle(Request::NoteOn {
                key: 200,
                velocity: 100
            })),
            ErrorKind::InvalidRequest
        );
        assert_eq!(
            error_kind(bridge.handle(Request::SetGain { gain: f32::NAN })),
            ErrorKind::InvalidRequest
        );
        assert_eq!(
            error_kind(bridge.handle(Request::SetPreset {
                bank_id: "nope".to_string(),
                preset_id: "x".to_string(),
            })),
            ErrorKind::NotFound
        );
        assert_eq!(
            error_kind(bridge.handle(Request::AddSoundfont {
                name: "bad".to_string(),
                data: b"garbage".to_vec(),
            })),
            ErrorKind::Decode
        );
    }

    #[test]
    fn test_json_requests() {
        let (mut bridge, _port) = ControlBridge::new();
        let reply = bridge.handle_json(r#"{"type":"initialize"}"#);
        assert_eq!(reply, r#"{"type":"ok"}"#);

        let reply = bridge.handle_json(r#"{"type":"note_on","key":60}"#);
        assert_eq!(reply, r#"{"type":"ok"}"#);

        let reply: serde_json::Value =
            serde_json::from_str(&bridge.handle_json(r#"{"type":"get_state"}"#)).unwrap();
        assert_eq!(reply["type"], "state");
        assert_eq!(reply["state"]["current_bank"], "default");

        let reply: serde_json::Value =
            serde_json::from_str(&bridge.handle_json(r#"{"type":"explode"}"#)).unwrap();
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["error"]["kind"], "invalid_request");
    }

    #[test]
    fn test_note_on_default_velocity() {
        let request: Request = serde_json::from_str(r#"{"type":"note_on","key":64}"#).unwrap();
        assert_eq!(
            request,
            Request::NoteOn {
                key: 64,
                velocity: DEFAULT_VELOCITY
            }
        );
    }
}
