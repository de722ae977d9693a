use serde_json::{Map, Value, json};

use crate::agent::AgentRegistry;
use crate::session::{CapturedMessage, Sender, Session};
use crate::tool::{Envelope, ToolDispatcher};

/// Gateway defaults overlaid under every composed session, per the
/// documented default session configuration.
pub fn default_session_config() -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert("modalities".into(), json!(["text", "audio"]));
    defaults.insert("voice".into(), json!("shimmer"));
    defaults.insert("input_audio_format".into(), json!("pcm16"));
    defaults.insert("output_audio_format".into(), json!("pcm16"));
    defaults.insert(
        "input_audio_transcription".into(),
        json!({"model": "whisper-1"}),
    );
    defaults.insert("turn_detection".into(), json!({"type": "server_vad"}));
    defaults.insert("tools".into(), json!([]));
    defaults.insert("tool_choice".into(), json!("auto"));
    defaults.insert("temperature".into(), json!(0.8));
    defaults.insert("max_response_output_tokens".into(), json!(4096));
    defaults
}

/// Overlays a client-supplied `session` object on top of the gateway
/// defaults, injecting root instructions/tools only when the client left
/// them unset. This is a full rebuild, not layered over any prior
/// composed session: each client `session.update` is treated as
/// expressing the client's complete intent.
fn compose_from_client(
    client_session: &Map<String, Value>,
    root_instructions: Option<&str>,
    root_tools: Option<&[Value]>,
) -> Map<String, Value> {
    let mut composed = default_session_config();
    for (k, v) in client_session {
        composed.insert(k.clone(), v.clone());
    }
    if !composed.contains_key("instructions") {
        if let Some(instructions) = root_instructions {
            composed.insert("instructions".into(), json!(instructions));
        }
    }
    if !composed.contains_key("tools") {
        if let Some(tools) = root_tools {
            composed.insert("tools".into(), json!(tools));
        }
    }
    composed
}

/// Layers dispatcher-supplied overrides (an agent switch's instructions/
/// tools/turn_detection) over the previously composed session, which is
/// itself layered over the gateway defaults. Keys already present in
/// `previous` survive unless `overrides` sets them, satisfying the
/// "fields never regress to missing" invariant for the dispatch path.
pub fn compose_session_update(
    previous: &Map<String, Value>,
    overrides: &Map<String, Value>,
) -> Map<String, Value> {
    let mut base = default_session_config();
    for (k, v) in previous {
        base.insert(k.clone(), v.clone());
    }
    for (k, v) in overrides {
        base.insert(k.clone(), v.clone());
    }
    base
}

/// Applies §4.5.1's client→upstream interception. Returns the frame to
/// send upstream, unchanged for any type other than `session.update`
/// (audio frames are forwarded unchanged too, just traced at a quieter level).
pub fn handle_client_frame(frame: Value, session: &mut Session, registry: &AgentRegistry) -> Value {
    let Some(frame_type) = frame.get("type").and_then(Value::as_str) else {
        return frame;
    };

    if frame_type == "input_audio_buffer.append" {
        tracing::trace!(target: "bridge", "client audio frame");
        return frame;
    }

    if frame_type != "session.update" {
        return frame;
    }

    let client_session = frame
        .get("session")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let root = registry.get("root").ok();
    let root_instructions = root.as_ref().map(|a| a.system_message.as_str());
    let root_tools: Option<Vec<Value>> = root
        .as_ref()
        .and_then(|a| registry.tools_for(&a.id).ok())
        .map(|tools| tools.iter().map(|t| t.as_schema()).collect());

    let composed = compose_from_client(&client_session, root_instructions, root_tools.as_deref());
    session.composed_session = composed.clone();

    let mut out = frame;
    out["session"] = Value::Object(composed);
    out
}

/// Applies §4.5.2's upstream→client interception, returning the frames
/// (if any) to send upstream as a consequence. The original upstream
/// frame is always forwarded unchanged to the client by the caller,
/// regardless of what (if anything) this returns.
pub async fn handle_upstream_frame(
    frame: &Value,
    session: &mut Session,
    dispatcher: &ToolDispatcher,
) -> Vec<Value> {
    let Some(frame_type) = frame.get("type").and_then(Value::as_str) else {
        return Vec::new();
    };

    match frame_type {
        "response.function_call_arguments.done" => {
            handle_tool_call(frame, session, dispatcher).await
        },
        "conversation.item.input_audio_transcription.completed" => {
            if let Some(text) = frame.get("transcript").and_then(Value::as_str) {
                session.messages.push(CapturedMessage {
                    sender: Sender::User,
                    text: text.to_string(),
                    interrupted: false,
                });
            }
            Vec::new()
        },
        "response.audio_transcript.done" => {
            if let Some(text) = frame.get("transcript").and_then(Value::as_str) {
                session.messages.push(CapturedMessage {
                    sender: Sender::Assistant,
                    text: text.to_string(),
                    interrupted: false,
                });
            }
            Vec::new()
        },
        "input_audio_buffer.speech_started" => {
            session.mark_last_assistant_message_interrupted();
            Vec::new()
        },
        "response.audio.delta" => {
            tracing::trace!(target: "bridge", "upstream audio frame");
            Vec::new()
        },
        _ => Vec::new(),
    }
}

async fn handle_tool_call(frame: &Value, session: &mut Session, dispatcher: &ToolDispatcher) -> Vec<Value> {
    let call_id = frame.get("call_id").and_then(Value::as_str).unwrap_or_default().to_string();
    let Some(name) = frame.get("name").and_then(Value::as_str) else {
        return vec![
            json!({
                "type": "conversation.item.create",
                "item": {
                    "type": "function_call_output",
                    "call_id": call_id,
                    "output": json!({"error": "Tool name missing"}).to_string(),
                },
            }),
            json!({"type": "response.create"}),
        ];
    };

    let arguments_raw = frame.get("arguments").and_then(Value::as_str).unwrap_or("{}");
    let arguments_raw = if arguments_raw.is_empty() { "{}" } else { arguments_raw };
    let parameters: Value = serde_json::from_str(arguments_raw).unwrap_or_else(|_| json!({}));

    match dispatcher.invoke(name, parameters, &call_id).await {
        Envelope::SessionUpdate {
            instructions,
            tools,
            turn_detection,
        } => {
            session.active_agent_id = name.to_string();
            session.record_agent_used(name);

            let mut overrides = Map::new();
            overrides.insert("instructions".into(), json!(instructions));
            overrides.insert("tools".into(), json!(tools));
            overrides.insert("turn_detection".into(), turn_detection);

            let composed = compose_session_update(&session.composed_session, &overrides);
            session.composed_session = composed.clone();

            vec![
                json!({"type": "session.update", "session": composed}),
                json!({"type": "response.create"}),
            ]
        },
        Envelope::FunctionOutput { call_id, output } => {
            session.tools_called.insert(name.to_string());
            vec![
                json!({
                    "type": "conversation.item.create",
                    "item": {"type": "function_call_output", "call_id": call_id, "output": output},
                }),
                json!({"type": "response.create"}),
            ]
        },
    }
}
