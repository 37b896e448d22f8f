use serde_json::Value;

use crate::types::Direction;

/// Client messages accepted over the WebSocket. Parsing is tolerant of
/// unknown fields but strict about fields that are present and malformed.
#[derive(Debug)]
pub enum ParsedClientMessage {
    Hello {
        name: String,
        reconnect_token: Option<String>,
    },
    StartGame {
        seed: Option<i64>,
        time_limit_minutes: Option<i64>,
    },
    Input {
        dir: Direction,
    },
    SetAutopilot {
        enabled: bool,
        clever: bool,
    },
    Ping {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let name = object.get("name")?.as_str()?.to_string();
            let reconnect_token = match object.get("reconnectToken") {
                None => None,
                Some(value) => Some(value.as_str()?.to_string()),
            };
            Some(ParsedClientMessage::Hello {
                name,
                reconnect_token,
            })
        }
        "start_game" => {
            let seed = parse_optional_i64(object.get("seed"))?;
            let time_limit_minutes = parse_optional_i64(object.get("timeLimitMinutes"))?;
            Some(ParsedClientMessage::StartGame {
                seed,
                time_limit_minutes,
            })
        }
        "input" => {
            let dir = Direction::parse_move(object.get("dir")?.as_str()?)?;
            Some(ParsedClientMessage::Input { dir })
        }
        "set_autopilot" => {
            let enabled = object.get("enabled")?.as_bool()?;
            let clever = match object.get("clever") {
                None => false,
                Some(value) => value.as_bool()?,
            };
            Some(ParsedClientMessage::SetAutopilot { enabled, clever })
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

fn parse_optional_i64(value: Option<&Value>) -> Option<Option<i64>> {
    const MAX_SAFE_INTEGER_F64: f64 = 9_007_199_254_740_991.0;

    let Some(value) = value else {
        return Some(None);
    };
    if let Some(number) = value.as_i64() {
        return Some(Some(number));
    }
    if let Some(number) = value.as_u64() {
        return i64::try_from(number).ok().map(Some);
    }
    if let Some(number) = value.as_f64() {
        if number.is_finite() {
            let floored = number.floor();
            if floored.abs() > MAX_SAFE_INTEGER_F64 {
                return None;
            }
            return Some(Some(floored as i64));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hello_message() {
        let parsed = parse_client_message(r#"{"type":"hello","name":"A"}"#)
            .expect("hello message should parse");
        match parsed {
            ParsedClientMessage::Hello {
                name,
                reconnect_token,
            } => {
                assert_eq!(name, "A");
                assert_eq!(reconnect_token, None);
            }
            _ => panic!("expected hello message"),
        }
    }

    #[test]
    fn parse_hello_with_reconnect_token() {
        let parsed = parse_client_message(r#"{"type":"hello","name":"A","reconnectToken":"tok"}"#)
            .expect("hello message should parse");
        match parsed {
            ParsedClientMessage::Hello {
                reconnect_token, ..
            } => assert_eq!(reconnect_token.as_deref(), Some("tok")),
            _ => panic!("expected hello message"),
        }
    }

    #[test]
    fn parse_start_game_message() {
        let parsed =
            parse_client_message(r#"{"type":"start_game","seed":42,"timeLimitMinutes":3}"#)
                .expect("start_game should parse");
        match parsed {
            ParsedClientMessage::StartGame {
                seed,
                time_limit_minutes,
            } => {
                assert_eq!(seed, Some(42));
                assert_eq!(time_limit_minutes, Some(3));
            }
            _ => panic!("expected start_game message"),
        }
    }

    #[test]
    fn parse_start_game_floors_float_values() {
        let parsed = parse_client_message(r#"{"type":"start_game","seed":1.9}"#)
            .expect("start_game should parse");
        assert!(matches!(
            parsed,
            ParsedClientMessage::StartGame { seed: Some(1), .. }
        ));
    }

    #[test]
    fn parse_start_game_rejects_overflow_numbers() {
        assert!(parse_client_message(r#"{"type":"start_game","seed":18446744073709551615}"#).is_none());
        assert!(parse_client_message(r#"{"type":"start_game","seed":1e100}"#).is_none());
    }

    #[test]
    fn parse_input_rejects_invalid_direction() {
        assert!(parse_client_message(r#"{"type":"input","dir":"diagonal"}"#).is_none());
        assert!(parse_client_message(r#"{"type":"input"}"#).is_none());
    }

    #[test]
    fn parse_input_accepts_none_direction() {
        let parsed = parse_client_message(r#"{"type":"input","dir":"none"}"#);
        assert!(matches!(
            parsed,
            Some(ParsedClientMessage::Input {
                dir: Direction::None
            })
        ));
    }

    #[test]
    fn parse_set_autopilot_defaults_clever_off() {
        let parsed = parse_client_message(r#"{"type":"set_autopilot","enabled":true}"#);
        assert!(matches!(
            parsed,
            Some(ParsedClientMessage::SetAutopilot {
                enabled: true,
                clever: false
            })
        ));
        let parsed =
            parse_client_message(r#"{"type":"set_autopilot","enabled":true,"clever":true}"#);
        assert!(matches!(
            parsed,
            Some(ParsedClientMessage::SetAutopilot {
                enabled: true,
                clever: true
            })
        ));
    }

    #[test]
    fn parse_ping_requires_finite_number() {
        assert!(matches!(
            parse_client_message(r#"{"type":"ping","t":12.5}"#),
            Some(ParsedClientMessage::Ping { .. })
        ));
        assert!(parse_client_message(r#"{"type":"ping","t":"soon"}"#).is_none());
    }

    #[test]
    fn unknown_message_types_are_rejected() {
        assert!(parse_client_message(r#"{"type":"emote","name":"wave"}"#).is_none());
        assert!(parse_client_message("not json").is_none());
    }
}
