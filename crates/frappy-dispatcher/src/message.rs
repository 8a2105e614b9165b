//! The SECoP wire grammar: `action[ specifier[ data]]`, `data` being a
//! JSON payload that may itself contain spaces, so only the first two
//! are treated as field separators.

use frappy_core::{SecopError, SecopResult};

use crate::error_mapping::wire_kind;

/// The identify string this node answers `*IDN?` with.
pub const IDN_REPLY: &str = "ISSE&SINE2020,SECoP,V2.0";

/// A parsed request line, module-qualified specifiers already split.
#[derive(Debug, Clone)]
pub enum Request {
    Idn,
    Describe,
    Activate(Option<String>),
    Deactivate(Option<String>),
    Read { module: String, parameter: String },
    Change { module: String, parameter: String, data: serde_json::Value },
    Do { module: String, command: String, argument: Option<serde_json::Value> },
    Ping(Option<String>),
}

struct ParsedLine {
    action: String,
    specifier: Option<String>,
    data: Option<String>,
}

fn split_line(line: &str) -> SecopResult<ParsedLine> {
    let line = line.trim();
    if line.is_empty() {
        return Err(SecopError::ProtocolError("empty message".to_string()));
    }
    let mut parts = line.splitn(3, ' ');
    let action = parts.next().unwrap_or_default().to_string();
    let specifier = parts.next().map(str::to_string);
    let data = parts.next().map(str::to_string);
    Ok(ParsedLine { action, specifier, data })
}

fn split_specifier(specifier: Option<String>, action: &str) -> SecopResult<(String, String)> {
    let specifier = specifier.ok_or_else(|| {
        SecopError::ProtocolError(format!("'{action}' requires a module:accessible specifier"))
    })?;
    specifier.split_once(':').map(|(m, a)| (m.to_string(), a.to_string())).ok_or_else(|| {
        SecopError::ProtocolError(format!("specifier '{specifier}' is missing ':accessible'"))
    })
}

fn parse_json(data: Option<String>, action: &str) -> SecopResult<serde_json::Value> {
    let data = data.ok_or_else(|| SecopError::ProtocolError(format!("'{action}' requires a JSON value")))?;
    serde_json::from_str(&data).map_err(|e| SecopError::ProtocolError(format!("malformed JSON: {e}")))
}

/// Parse one line of client input into a [`Request`]. An unrecognised
/// action is a `ProtocolError`, never a panic.
pub fn parse_request(line: &str) -> SecopResult<Request> {
    let parsed = split_line(line)?;
    match parsed.action.as_str() {
        "*IDN?" => Ok(Request::Idn),
        "describe" => Ok(Request::Describe),
        "activate" => Ok(Request::Activate(parsed.specifier)),
        "deactivate" => Ok(Request::Deactivate(parsed.specifier)),
        "ping" => Ok(Request::Ping(parsed.specifier)),
        "read" => {
            let (module, parameter) = split_specifier(parsed.specifier, "read")?;
            Ok(Request::Read { module, parameter })
        }
        "change" => {
            let (module, parameter) = split_specifier(parsed.specifier, "change")?;
            let data = parse_json(parsed.data, "change")?;
            Ok(Request::Change { module, parameter, data })
        }
        "do" => {
            let (module, command) = split_specifier(parsed.specifier, "do")?;
            let argument = match parsed.data {
                Some(raw) => Some(
                    serde_json::from_str(&raw)
                        .map_err(|e| SecopError::ProtocolError(format!("malformed JSON: {e}")))?,
                ),
                None => None,
            };
            Ok(Request::Do { module, command, argument })
        }
        other => Err(SecopError::ProtocolError(format!("unknown action '{other}'"))),
    }
}

fn encode_pair(value: &serde_json::Value, timestamp: f64) -> SecopResult<String> {
    let qualifiers = serde_json::json!({ "t": timestamp });
    serde_json::to_string(&serde_json::json!([value, qualifiers]))
        .map_err(|e| SecopError::InternalError(format!("failed to encode reply: {e}")))
}

/// `update <mod>:<param> [value,{t:…}]`
pub fn update_message(module: &str, parameter: &str, value: &serde_json::Value, timestamp: f64) -> SecopResult<String> {
    Ok(format!("update {module}:{parameter} {}", encode_pair(value, timestamp)?))
}

/// `error_update <mod>:<param> [kind, message, {t:…}]` — the async
/// counterpart of `update`, sent instead of it whenever the parameter's
/// last read/poll failed.
pub fn error_update_message(module: &str, parameter: &str, kind: &str, message: &str, timestamp: f64) -> SecopResult<String> {
    let qualifiers = serde_json::json!({ "t": timestamp });
    let detail = serde_json::to_string(&serde_json::json!([kind, message, qualifiers]))
        .map_err(|e| SecopError::InternalError(format!("failed to encode error update: {e}")))?;
    Ok(format!("error_update {module}:{parameter} {detail}"))
}

/// `reply <mod>:<param> [value,{t:…}]`
pub fn read_reply(module: &str, parameter: &str, value: &serde_json::Value, timestamp: f64) -> SecopResult<String> {
    Ok(format!("reply {module}:{parameter} {}", encode_pair(value, timestamp)?))
}

/// `changed <mod>:<param> [value,{t:…}]`
pub fn changed_reply(module: &str, parameter: &str, value: &serde_json::Value, timestamp: f64) -> SecopResult<String> {
    Ok(format!("changed {module}:{parameter} {}", encode_pair(value, timestamp)?))
}

/// `done <mod>:<cmd> [result,{t:…}]` — `result` is JSON `null` for a
/// command with no declared result.
pub fn done_reply(module: &str, command: &str, result: &serde_json::Value, timestamp: f64) -> SecopResult<String> {
    Ok(format!("done {module}:{command} {}", encode_pair(result, timestamp)?))
}

/// `active [module]`
pub fn active_reply(module: Option<&str>) -> String {
    match module {
        Some(m) => format!("active {m}"),
        None => "active".to_string(),
    }
}

/// `inactive [module]`
pub fn inactive_reply(module: Option<&str>) -> String {
    match module {
        Some(m) => format!("inactive {m}"),
        None => "inactive".to_string(),
    }
}

/// `pong [token] [,{t:…}]`
pub fn pong_reply(token: Option<&str>, timestamp: f64) -> String {
    let qualifiers = serde_json::json!({ "t": timestamp });
    match token {
        Some(t) => format!("pong {t} {qualifiers}"),
        None => format!("pong {qualifiers}"),
    }
}

/// `describing . <json>`
pub fn describe_reply(describe_json: &serde_json::Value) -> String {
    format!("describing . {describe_json}")
}

/// `error_<action> <specifier> [kind, message, {t:…}]` — `action` is the
/// *original request's* action word (e.g. `change`, `read`, `do`), not
/// the error kind: a client decodes this as `action specifier data` just
/// like any other reply, so the kind only ever appears inside the JSON
/// detail array. `specifier` is the bare `module[:accessible]` the
/// request named, or `.` if none could be recovered (e.g. a line that
/// failed to parse before an action was even known).
pub fn error_reply(action: &str, specifier: &str, err: &SecopError, timestamp: f64) -> SecopResult<String> {
    let kind = wire_kind(err);
    let qualifiers = serde_json::json!({ "t": timestamp });
    let detail = serde_json::to_string(&serde_json::json!([kind, err.to_string(), qualifiers]))
        .map_err(|e| SecopError::InternalError(format!("failed to encode error reply: {e}")))?;
    Ok(format!("error_{action} {specifier} {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_read_request() {
        let req = parse_request("read th:value").unwrap();
        assert!(matches!(req, Request::Read { module, parameter } if module == "th" && parameter == "value"));
    }

    #[test]
    fn parses_change_request_with_json_array_value() {
        let req = parse_request(r#"change th:target [20.5,{"t":12345}]"#).unwrap();
        match req {
            Request::Change { module, parameter, data } => {
                assert_eq!(module, "th");
                assert_eq!(parameter, "target");
                assert_eq!(data, serde_json::json!([20.5, {"t": 12345}]));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_action_is_a_protocol_error() {
        let err = parse_request("frobnicate th:value").unwrap_err();
        assert!(matches!(err, SecopError::ProtocolError(_)));
    }

    #[test]
    fn missing_colon_specifier_is_rejected() {
        let err = parse_request("read th").unwrap_err();
        assert!(matches!(err, SecopError::ProtocolError(_)));
    }

    #[test]
    fn activate_without_module_is_node_wide() {
        let req = parse_request("activate").unwrap();
        assert!(matches!(req, Request::Activate(None)));
    }

    #[test]
    fn do_without_argument_parses() {
        let req = parse_request("do th:stop").unwrap();
        assert!(matches!(req, Request::Do { argument: None, .. }));
    }

    #[test]
    fn error_reply_echoes_the_original_action_with_a_bare_specifier_s4() {
        let err = SecopError::ReadOnly { module: "t".to_string(), parameter: "value".to_string() };
        let reply = error_reply("change", "t:value", &err, 12345.0).unwrap();
        assert!(reply.starts_with("error_change t:value ["));
        let data: serde_json::Value = serde_json::from_str(reply.strip_prefix("error_change t:value ").unwrap()).unwrap();
        assert_eq!(data[0], "ReadOnly");
        assert_eq!(data[2]["t"], 12345.0);
    }

    #[test]
    fn error_update_message_carries_kind_and_message_not_a_bare_string() {
        let line = error_update_message("th", "value", "CommFailed", "timeout", 1.0).unwrap();
        assert!(line.starts_with("error_update th:value ["));
        let data: serde_json::Value = serde_json::from_str(line.strip_prefix("error_update th:value ").unwrap()).unwrap();
        assert_eq!(data[0], "CommFailed");
        assert_eq!(data[1], "timeout");
    }
}
