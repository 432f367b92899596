//! Wire protocol shared by the tether bridge and its controller.
//! Keeping this in a dedicated crate allows regeneration of bindings
//! for controller implementations in other languages without pulling
//! in the bridge runtime.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const PROTOCOL_VERSION: &str = "1";

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("inbound message is not a json object")]
    NotAnObject,
    #[error("unsupported protocol version `{0}`")]
    UnsupportedVersion(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("unknown legacy action `{0}`")]
    UnknownAction(String),
}

/// Relative camera rotation, degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LookCommand {
    #[serde(rename = "dYaw", default)]
    pub d_yaw: f32,
    #[serde(rename = "dPitch", default)]
    pub d_pitch: f32,
}

/// Movement input in `[-1, 1]` on both axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveCommand {
    #[serde(default)]
    pub forward: f32,
    #[serde(default)]
    pub strafe: f32,
}

/// The structured action payload. Every sub-command is independently
/// optional; boolean sub-commands are requested only when `true`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub look: Option<LookCommand>,
    #[serde(default, rename = "move", skip_serializing_if = "Option::is_none")]
    pub movement: Option<MoveCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jump: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sneak: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_slot: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack: Option<bool>,
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_item: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<bool>,
}

impl ActionPayload {
    /// Expands the payload into the sub-commands it actually requests,
    /// in a fixed order (continuous inputs first, then discrete ones).
    pub fn commands(&self) -> Vec<SubCommand> {
        let mut out = Vec::new();
        if let Some(look) = self.look {
            out.push(SubCommand::Look(look));
        }
        if let Some(movement) = self.movement {
            out.push(SubCommand::Move(movement));
        }
        if self.jump == Some(true) {
            out.push(SubCommand::Jump);
        }
        if self.sneak == Some(true) {
            out.push(SubCommand::Sneak);
        }
        if let Some(slot) = self.select_slot {
            out.push(SubCommand::SelectSlot(slot));
        }
        if self.attack == Some(true) {
            out.push(SubCommand::Attack);
        }
        if self.use_item == Some(true) {
            out.push(SubCommand::Use);
        }
        if self.place == Some(true) {
            out.push(SubCommand::Place);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.commands().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubCommand {
    Look(LookCommand),
    Move(MoveCommand),
    Jump,
    Sneak,
    SelectSlot(u8),
    Attack,
    Use,
    Place,
}

impl SubCommand {
    pub fn kind(&self) -> ActionKind {
        match self {
            SubCommand::Look(_) => ActionKind::Look,
            SubCommand::Move(_) => ActionKind::Move,
            SubCommand::Jump => ActionKind::Jump,
            SubCommand::Sneak => ActionKind::Sneak,
            SubCommand::SelectSlot(_) => ActionKind::SelectSlot,
            SubCommand::Attack => ActionKind::Attack,
            SubCommand::Use => ActionKind::Use,
            SubCommand::Place => ActionKind::Place,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Look,
    Move,
    Jump,
    Sneak,
    SelectSlot,
    Attack,
    Use,
    Place,
}

impl ActionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ActionKind::Look => "look",
            ActionKind::Move => "move",
            ActionKind::Jump => "jump",
            ActionKind::Sneak => "sneak",
            ActionKind::SelectSlot => "select_slot",
            ActionKind::Attack => "attack",
            ActionKind::Use => "use",
            ActionKind::Place => "place",
        }
    }

    /// Kinds that are rate-limited to one execution per configured interval.
    pub const fn cooldown_gated(self) -> bool {
        matches!(self, ActionKind::Attack | ActionKind::Use | ActionKind::Place)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded inbound command message. `seq` is `None` only for the legacy
/// flat shape, which predates sequence correlation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionMessage {
    pub seq: Option<u64>,
    pub action_id: Option<String>,
    pub payload: Option<ActionPayload>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Action(ActionMessage),
    /// A well-formed message of a kind the bridge does not consume.
    Ignored { kind: String },
}

#[derive(Debug, Deserialize)]
struct RawStructuredAction {
    seq: Option<u64>,
    #[serde(default)]
    action_id: Option<String>,
    #[serde(default)]
    payload: Option<ActionPayload>,
}

#[derive(Debug, Deserialize)]
struct RawLegacyAction {
    action: String,
    #[serde(default)]
    params: Value,
}

/// Decodes one inbound wire message. The structured `{kind:"action", seq,
/// payload}` shape and the legacy flat `{action, params}` shape are both
/// accepted; anything else well-formed is reported as `Ignored`.
pub fn decode_inbound(raw: &str) -> Result<Inbound, ProtoError> {
    let value: Value = serde_json::from_str(raw)?;
    let obj = value.as_object().ok_or(ProtoError::NotAnObject)?;

    if let Some(proto) = obj.get("proto").and_then(Value::as_str) {
        if proto != PROTOCOL_VERSION {
            return Err(ProtoError::UnsupportedVersion(proto.to_string()));
        }
    }

    match obj.get("kind").and_then(Value::as_str) {
        Some("action") => {
            let raw: RawStructuredAction = serde_json::from_value(value.clone())?;
            let seq = raw.seq.ok_or(ProtoError::MissingField("seq"))?;
            Ok(Inbound::Action(ActionMessage {
                seq: Some(seq),
                action_id: raw.action_id,
                payload: raw.payload,
            }))
        }
        Some(kind) => Ok(Inbound::Ignored {
            kind: kind.to_string(),
        }),
        None if obj.contains_key("action") => {
            let raw: RawLegacyAction = serde_json::from_value(value.clone())?;
            let payload = legacy_payload(&raw.action, &raw.params)?;
            Ok(Inbound::Action(ActionMessage {
                seq: None,
                action_id: None,
                payload: Some(payload),
            }))
        }
        None => Err(ProtoError::MissingField("kind")),
    }
}

fn legacy_payload(action: &str, params: &Value) -> Result<ActionPayload, ProtoError> {
    let mut payload = ActionPayload::default();
    match action {
        "look" => {
            payload.look = Some(serde_json::from_value(params.clone()).unwrap_or_default());
        }
        "move" => {
            payload.movement = Some(serde_json::from_value(params.clone()).unwrap_or_default());
        }
        "jump" => payload.jump = Some(true),
        "sneak" => payload.sneak = Some(true),
        "attack" => payload.attack = Some(true),
        "use" => payload.use_item = Some(true),
        "place" => payload.place = Some(true),
        "select_slot" => {
            let slot = params
                .get("slot")
                .and_then(Value::as_u64)
                .ok_or(ProtoError::MissingField("slot"))?;
            payload.select_slot = Some(slot.min(u8::MAX as u64) as u8);
        }
        other => return Err(ProtoError::UnknownAction(other.to_string())),
    }
    Ok(payload)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Fail,
    Cooldown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: String,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub server_tick: u64,
    pub ts_server: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeHealth {
    pub level: HealthLevel,
    pub detail: String,
}

impl BridgeHealth {
    pub fn info(detail: impl Into<String>) -> Self {
        Self {
            level: HealthLevel::Info,
            detail: detail.into(),
        }
    }

    pub fn warn(detail: impl Into<String>) -> Self {
        Self {
            level: HealthLevel::Warn,
            detail: detail.into(),
        }
    }
}

pub fn encode_observation(seq: u64, timestamp_ms: u64, payload: &Value) -> Result<String, ProtoError> {
    let msg = json!({
        "proto": PROTOCOL_VERSION,
        "kind": "observation",
        "seq": seq,
        "timestamp": timestamp_ms,
        "payload": payload,
    });
    Ok(serde_json::to_string(&msg)?)
}

pub fn encode_action_result(timestamp_ms: u64, result: &ActionResult) -> Result<String, ProtoError> {
    let msg = json!({
        "proto": PROTOCOL_VERSION,
        "kind": "action_result",
        "timestamp": timestamp_ms,
        "payload": { "action_result": result },
    });
    Ok(serde_json::to_string(&msg)?)
}

pub fn encode_bridge_health(timestamp_ms: u64, health: &BridgeHealth) -> Result<String, ProtoError> {
    let msg = json!({
        "proto": PROTOCOL_VERSION,
        "kind": "bridge_health",
        "timestamp": timestamp_ms,
        "payload": { "bridge_health": health },
    });
    Ok(serde_json::to_string(&msg)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_structured_action() {
        let raw = r#"{"kind":"action","seq":42,"action_id":"a-7","payload":{"look":{"dYaw":10.0,"dPitch":-5.0},"move":{"forward":1.0,"strafe":0.0},"jump":true}}"#;
        let Inbound::Action(msg) = decode_inbound(raw).unwrap() else {
            panic!("expected action");
        };
        assert_eq!(msg.seq, Some(42));
        assert_eq!(msg.action_id.as_deref(), Some("a-7"));
        let commands = msg.payload.unwrap().commands();
        assert_eq!(commands.len(), 3);
        assert!(matches!(commands[0], SubCommand::Look(look) if look.d_yaw == 10.0));
        assert!(matches!(commands[1], SubCommand::Move(m) if m.forward == 1.0));
        assert_eq!(commands[2], SubCommand::Jump);
    }

    #[test]
    fn false_flags_are_not_commands() {
        let raw = r#"{"kind":"action","seq":1,"payload":{"jump":false,"attack":false}}"#;
        let Inbound::Action(msg) = decode_inbound(raw).unwrap() else {
            panic!("expected action");
        };
        assert!(msg.payload.unwrap().is_empty());
    }

    #[test]
    fn decodes_legacy_flat_action() {
        let Inbound::Action(msg) =
            decode_inbound(r#"{"action":"jump","params":{}}"#).unwrap()
        else {
            panic!("expected action");
        };
        assert_eq!(msg.seq, None);
        assert_eq!(msg.payload.unwrap().commands(), vec![SubCommand::Jump]);

        let Inbound::Action(msg) =
            decode_inbound(r#"{"action":"look","params":{"dYaw":3.5,"dPitch":0.0}}"#).unwrap()
        else {
            panic!("expected action");
        };
        let commands = msg.payload.unwrap().commands();
        assert!(matches!(commands[0], SubCommand::Look(look) if look.d_yaw == 3.5));

        let Inbound::Action(msg) =
            decode_inbound(r#"{"action":"select_slot","params":{"slot":3}}"#).unwrap()
        else {
            panic!("expected action");
        };
        assert_eq!(
            msg.payload.unwrap().commands(),
            vec![SubCommand::SelectSlot(3)]
        );
    }

    #[test]
    fn unknown_legacy_action_is_an_error() {
        let err = decode_inbound(r#"{"action":"teleport","params":{}}"#).unwrap_err();
        assert!(matches!(err, ProtoError::UnknownAction(name) if name == "teleport"));
    }

    #[test]
    fn non_action_kinds_are_ignored() {
        let decoded = decode_inbound(r#"{"kind":"bridge_health","seq":0,"payload":{}}"#).unwrap();
        assert_eq!(
            decoded,
            Inbound::Ignored {
                kind: "bridge_health".to_string()
            }
        );
    }

    #[test]
    fn rejects_foreign_protocol_version() {
        let err = decode_inbound(r#"{"proto":"2","kind":"action","seq":1}"#).unwrap_err();
        assert!(matches!(err, ProtoError::UnsupportedVersion(v) if v == "2"));
    }

    #[test]
    fn structured_action_requires_seq() {
        let err = decode_inbound(r#"{"kind":"action","payload":{"jump":true}}"#).unwrap_err();
        assert!(matches!(err, ProtoError::MissingField("seq")));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(decode_inbound("{not json").is_err());
        assert!(matches!(
            decode_inbound(r#""just a string""#),
            Err(ProtoError::NotAnObject)
        ));
    }

    #[test]
    fn observation_envelope_shape() {
        let payload = json!({"pose": {"x": 1.0}});
        let text = encode_observation(100, 1_700_000_000_000, &payload).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["proto"], "1");
        assert_eq!(value["kind"], "observation");
        assert_eq!(value["seq"], 100);
        assert_eq!(value["payload"]["pose"]["x"], 1.0);
    }

    #[test]
    fn action_result_envelope_shape() {
        let result = ActionResult {
            action_id: "jump@100".to_string(),
            status: ActionStatus::Fail,
            reason: Some("not_grounded".to_string()),
            server_tick: 812,
            ts_server: 1_700_000_000_000,
            latency_ms: Some(38),
        };
        let text = encode_action_result(1_700_000_000_000, &result).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        let body = &value["payload"]["action_result"];
        assert_eq!(value["kind"], "action_result");
        assert_eq!(body["status"], "fail");
        assert_eq!(body["reason"], "not_grounded");
        assert_eq!(body["latency_ms"], 38);
    }

    #[test]
    fn bridge_health_envelope_shape() {
        let text =
            encode_bridge_health(1_700_000_000_000, &BridgeHealth::warn("dropped_input")).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["kind"], "bridge_health");
        assert_eq!(value["payload"]["bridge_health"]["level"], "warn");
        assert_eq!(value["payload"]["bridge_health"]["detail"], "dropped_input");
    }
}
