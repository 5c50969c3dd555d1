//! Turning untrusted oracle output into a typed [`Action`].
//!
//! Nothing the oracle says reaches the device without passing through
//! [`ActionDispatcher::dispatch`]. Every rejection is an
//! [`ActionValidationError`] the agent records as step feedback, so the
//! oracle can correct itself on the next step.

use serde_json::{Map, Value};
use uiscout_core::action::{Action, ActionKind, ArgumentKind, DEFAULT_ELEMENT_INDEX, DpadKey};
use uiscout_core::device::{KeyCode, ScrollDirection};
use uiscout_core::error::ActionValidationError;
use uiscout_core::oracle::Decision;
use uiscout_core::tool::ToolDefinition;

/// Action names with this prefix call an external tool.
pub const TOOL_ACTION_PREFIX: &str = "tool-";

/// Answer fields that describe the decision rather than parameterize it.
pub const RESERVED_FIELDS: [&str; 3] = ["memo", "image_description", "action"];

/// A validated decision.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedAction {
    pub action: Action,
    pub memo: Option<String>,
    pub image_description: Option<String>,
}

/// Validates decisions against the actions and tools a task may use.
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    allowed: Vec<ActionKind>,
    tools: Vec<ToolDefinition>,
}

impl ActionDispatcher {
    pub fn new(allowed: Vec<ActionKind>, tools: Vec<ToolDefinition>) -> Self {
        Self { allowed, tools }
    }

    pub fn allowed(&self) -> &[ActionKind] {
        &self.allowed
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Whether an already-typed action is within this task's allowed set.
    pub fn permits(&self, action: &Action) -> bool {
        match action {
            Action::ExecuteTool { name, .. } => self.tools.iter().any(|t| &t.name == name),
            other => other.kind().is_some_and(|kind| self.allowed.contains(&kind)),
        }
    }

    /// Validate `decision` against the current screen's element count.
    pub fn dispatch(
        &self,
        decision: &Decision,
        element_count: usize,
    ) -> Result<DispatchedAction, ActionValidationError> {
        let (name, args) = split_decision(decision)?;
        let memo = string_field(&args, "memo");
        let image_description = string_field(&args, "image_description");

        let action = match name.strip_prefix(TOOL_ACTION_PREFIX) {
            Some(tool_name) => self.tool_action(tool_name, args)?,
            None => self.builtin_action(&name, &args, element_count)?,
        };

        Ok(DispatchedAction {
            action,
            memo,
            image_description,
        })
    }

    fn tool_action(&self, name: &str, mut args: Map<String, Value>) -> Result<Action, ActionValidationError> {
        if !self.tools.iter().any(|t| t.name == name) {
            return Err(ActionValidationError::UnknownTool {
                name: name.to_string(),
                available: self.tools.iter().map(|t| t.name.clone()).collect(),
            });
        }
        for field in RESERVED_FIELDS {
            args.remove(field);
        }
        Ok(Action::ExecuteTool {
            name: name.to_string(),
            arguments: Value::Object(args),
        })
    }

    fn builtin_action(
        &self,
        name: &str,
        args: &Map<String, Value>,
        element_count: usize,
    ) -> Result<Action, ActionValidationError> {
        let kind = ActionKind::from_name(name)
            .filter(|kind| self.allowed.contains(kind))
            .ok_or_else(|| ActionValidationError::UnknownAction {
                name: name.to_string(),
                available: self.allowed.iter().map(|k| k.name().to_string()).collect(),
            })?;

        let text = || text_argument(kind, args);
        let number = |default: u64| number_argument(args, default);
        let index = || {
            let index = number(DEFAULT_ELEMENT_INDEX) as usize;
            if index >= element_count {
                return Err(ActionValidationError::IndexOutOfBounds {
                    index,
                    count: element_count,
                });
            }
            Ok(index)
        };
        let times = || match kind.argument() {
            ArgumentKind::Number { default, max } => {
                let value = number(default);
                if value > max {
                    return Err(ActionValidationError::InvalidArgument {
                        action: kind.name().to_string(),
                        argument: "text".into(),
                        reason: format!("{value} exceeds the limit of {max}"),
                    });
                }
                Ok(value)
            }
            _ => Ok(1),
        };

        let action = match kind {
            ActionKind::ClickWithText => Action::ClickWithText { text: text()? },
            ActionKind::ClickWithId => Action::ClickWithId { id: text()? },
            ActionKind::ClickWithIndex => Action::ClickWithIndex { index: index()? },
            ActionKind::InputText => Action::InputText { text: text()? },
            ActionKind::BackPress => Action::BackPress,
            ActionKind::KeyPress => {
                let raw = text()?;
                let key = KeyCode::parse(&raw).ok_or_else(|| ActionValidationError::InvalidArgument {
                    action: kind.name().to_string(),
                    argument: "text".into(),
                    reason: format!("unknown key '{raw}'"),
                })?;
                Action::KeyPress { key }
            }
            ActionKind::Scroll => {
                let direction = match optional_text(args).as_deref().map(str::to_ascii_lowercase) {
                    Some(d) if d == "up" => ScrollDirection::Up,
                    _ => ScrollDirection::Down,
                };
                Action::Scroll { direction }
            }
            ActionKind::Wait => Action::Wait { millis: times()? },
            ActionKind::DpadUp => Action::Dpad { key: DpadKey::Up, times: times()? },
            ActionKind::DpadDown => Action::Dpad { key: DpadKey::Down, times: times()? },
            ActionKind::DpadLeft => Action::Dpad { key: DpadKey::Left, times: times()? },
            ActionKind::DpadRight => Action::Dpad { key: DpadKey::Right, times: times()? },
            ActionKind::DpadCenter => Action::Dpad { key: DpadKey::Center, times: times()? },
            ActionKind::DpadAutoFocusWithText => Action::DpadAutoFocusWithText { text: text()? },
            ActionKind::DpadAutoFocusWithId => Action::DpadAutoFocusWithId { id: text()? },
            ActionKind::DpadAutoFocusWithIndex => Action::DpadAutoFocusWithIndex { index: index()? },
            ActionKind::GoalAchieved => Action::GoalAchieved,
            ActionKind::Failed => Action::Failed,
        };
        Ok(action)
    }
}

/// Action name and argument object from either payload shape.
fn split_decision(decision: &Decision) -> Result<(String, Map<String, Value>), ActionValidationError> {
    match decision {
        Decision::ToolCall { name, arguments } => {
            let args = match arguments {
                Value::Object(map) => map.clone(),
                Value::Null => Map::new(),
                Value::String(raw) => parse_object(raw)?,
                other => {
                    return Err(ActionValidationError::MalformedPayload(format!(
                        "arguments of '{name}' must be an object, got {other}"
                    )));
                }
            };
            Ok((name.trim().to_string(), args))
        }
        Decision::Inline { body } => {
            let args = match body {
                Value::Object(map) => map.clone(),
                Value::String(raw) => parse_object(raw)?,
                other => {
                    return Err(ActionValidationError::MalformedPayload(format!(
                        "decision must be a JSON object, got {other}"
                    )));
                }
            };
            let name = args
                .get("action")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    ActionValidationError::MalformedPayload("missing 'action' field".into())
                })?;
            Ok((name, args))
        }
    }
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, ActionValidationError> {
    serde_json::from_str::<Map<String, Value>>(raw)
        .map_err(|e| ActionValidationError::MalformedPayload(format!("invalid JSON arguments: {e}")))
}

fn string_field(args: &Map<String, Value>, field: &str) -> Option<String> {
    args.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The `text` argument as a string, accepting JSON numbers too.
fn optional_text(args: &Map<String, Value>) -> Option<String> {
    match args.get("text")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_argument(kind: ActionKind, args: &Map<String, Value>) -> Result<String, ActionValidationError> {
    optional_text(args)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ActionValidationError::MissingArgument {
            action: kind.name().to_string(),
            argument: "text".into(),
        })
}

fn number_argument(args: &Map<String, Value>, default: u64) -> u64 {
    match args.get("text") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dispatcher() -> ActionDispatcher {
        let mut allowed = ActionKind::DEFAULTS.to_vec();
        allowed.push(ActionKind::DpadDown);
        ActionDispatcher::new(
            allowed,
            vec![ToolDefinition {
                name: "read_otp".into(),
                description: "Reads the latest OTP".into(),
                parameters: json!({"type": "object"}),
            }],
        )
    }

    fn call(name: &str, args: Value) -> Decision {
        Decision::tool_call(name, args)
    }

    #[test]
    fn click_with_text_from_tool_call() {
        let out = dispatcher()
            .dispatch(&call("ClickWithText", json!({"text": "Login", "memo": "tap login"})), 3)
            .unwrap();
        assert_eq!(out.action, Action::ClickWithText { text: "Login".into() });
        assert_eq!(out.memo.as_deref(), Some("tap login"));
    }

    #[test]
    fn inline_payload_with_case_insensitive_name() {
        let decision = Decision::inline(json!({
            "action": "inputtext",
            "text": "hello",
            "image_description": "a search box"
        }));
        let out = dispatcher().dispatch(&decision, 0).unwrap();
        assert_eq!(out.action, Action::InputText { text: "hello".into() });
        assert_eq!(out.image_description.as_deref(), Some("a search box"));
    }

    #[test]
    fn inline_payload_without_action_is_malformed() {
        let err = dispatcher()
            .dispatch(&Decision::inline(json!({"text": "x"})), 0)
            .unwrap_err();
        assert!(matches!(err, ActionValidationError::MalformedPayload(_)));
    }

    #[test]
    fn unknown_action_names_available_actions() {
        let err = dispatcher().dispatch(&call("Teleport", json!({})), 0).unwrap_err();
        match &err {
            ActionValidationError::UnknownAction { name, available } => {
                assert_eq!(name, "Teleport");
                assert!(available.contains(&"ClickWithText".to_string()));
                assert!(available.contains(&"DpadDown".to_string()));
            }
            other => panic!("Expected UnknownAction, got {other:?}"),
        }
        assert!(err.to_string().contains("ClickWithText"));
    }

    #[test]
    fn action_outside_allowed_set_is_unknown() {
        let err = dispatcher().dispatch(&call("DpadUp", json!({})), 0).unwrap_err();
        assert!(matches!(err, ActionValidationError::UnknownAction { .. }));
    }

    #[test]
    fn missing_text_is_rejected() {
        let err = dispatcher().dispatch(&call("ClickWithText", json!({})), 0).unwrap_err();
        assert_eq!(
            err,
            ActionValidationError::MissingArgument {
                action: "ClickWithText".into(),
                argument: "text".into(),
            }
        );
        let err = dispatcher()
            .dispatch(&call("InputText", json!({"text": "   "})), 0)
            .unwrap_err();
        assert!(matches!(err, ActionValidationError::MissingArgument { .. }));
    }

    #[test]
    fn index_is_bounds_checked() {
        let d = dispatcher();
        assert_eq!(
            d.dispatch(&call("ClickWithIndex", json!({"text": "2"})), 3).unwrap().action,
            Action::ClickWithIndex { index: 2 }
        );
        let err = d.dispatch(&call("ClickWithIndex", json!({"text": "3"})), 3).unwrap_err();
        assert_eq!(err, ActionValidationError::IndexOutOfBounds { index: 3, count: 3 });
    }

    #[test]
    fn unparsable_numbers_fall_back_to_defaults() {
        let d = dispatcher();
        assert_eq!(
            d.dispatch(&call("Wait", json!({"text": "a while"})), 0).unwrap().action,
            Action::Wait { millis: 1000 }
        );
        assert_eq!(
            d.dispatch(&call("Wait", json!({"text": 250})), 0).unwrap().action,
            Action::Wait { millis: 250 }
        );
        assert_eq!(
            d.dispatch(&call("DpadDown", json!({"text": "3"})), 0).unwrap().action,
            Action::Dpad { key: DpadKey::Down, times: 3 }
        );
        // non-numeric index defaults to the first element
        assert_eq!(
            d.dispatch(&call("ClickWithIndex", json!({"text": "first"})), 1).unwrap().action,
            Action::ClickWithIndex { index: 0 }
        );
    }

    #[test]
    fn oversized_repeat_counts_are_rejected() {
        let d = dispatcher();
        let err = d
            .dispatch(&call("DpadDown", json!({"text": "18446744073709551615"})), 0)
            .unwrap_err();
        assert!(matches!(
            err,
            ActionValidationError::InvalidArgument { ref action, .. } if action == "DpadDown"
        ));
        assert!(d.dispatch(&call("Wait", json!({"text": 86_400_000})), 0).is_err());
        assert_eq!(
            d.dispatch(&call("DpadDown", json!({"text": "50"})), 0).unwrap().action,
            Action::Dpad { key: DpadKey::Down, times: 50 }
        );
    }

    #[test]
    fn permits_follows_the_allowed_set() {
        let d = dispatcher();
        assert!(d.permits(&Action::Dpad { key: DpadKey::Down, times: 1 }));
        assert!(!d.permits(&Action::Dpad { key: DpadKey::Up, times: 1 }));
        assert!(d.permits(&Action::ExecuteTool {
            name: "read_otp".into(),
            arguments: json!({}),
        }));
        assert!(!d.permits(&Action::ExecuteTool {
            name: "wipe_device".into(),
            arguments: json!({}),
        }));
    }

    #[test]
    fn key_press_requires_a_known_key() {
        let d = dispatcher();
        assert_eq!(
            d.dispatch(&call("KeyPress", json!({"text": "enter"})), 0).unwrap().action,
            Action::KeyPress { key: KeyCode::Enter }
        );
        let err = d.dispatch(&call("KeyPress", json!({"text": "warp"})), 0).unwrap_err();
        assert!(matches!(err, ActionValidationError::InvalidArgument { .. }));
    }

    #[test]
    fn scroll_defaults_to_down() {
        let d = dispatcher();
        assert_eq!(
            d.dispatch(&call("Scroll", json!({})), 0).unwrap().action,
            Action::Scroll { direction: ScrollDirection::Down }
        );
        assert_eq!(
            d.dispatch(&call("Scroll", json!({"text": "UP"})), 0).unwrap().action,
            Action::Scroll { direction: ScrollDirection::Up }
        );
    }

    #[test]
    fn tool_action_strips_reserved_fields() {
        let out = dispatcher()
            .dispatch(
                &call(
                    "tool-read_otp",
                    json!({"mailbox": "qa@example.com", "memo": "need the code", "action": "x"}),
                ),
                0,
            )
            .unwrap();
        assert_eq!(
            out.action,
            Action::ExecuteTool {
                name: "read_otp".into(),
                arguments: json!({"mailbox": "qa@example.com"}),
            }
        );
        assert_eq!(out.memo.as_deref(), Some("need the code"));
    }

    #[test]
    fn unknown_tool_names_available_tools() {
        let err = dispatcher().dispatch(&call("tool-Read_OTP", json!({})), 0).unwrap_err();
        assert_eq!(
            err,
            ActionValidationError::UnknownTool {
                name: "Read_OTP".into(),
                available: vec!["read_otp".into()],
            }
        );
    }

    #[test]
    fn string_encoded_arguments_are_accepted() {
        let out = dispatcher()
            .dispatch(&call("ClickWithId", Value::String(r#"{"text": "btn_ok"}"#.into())), 0)
            .unwrap();
        assert_eq!(out.action, Action::ClickWithId { id: "btn_ok".into() });

        let err = dispatcher()
            .dispatch(&call("ClickWithId", Value::String("{oops".into())), 0)
            .unwrap_err();
        assert!(matches!(err, ActionValidationError::MalformedPayload(_)));
    }
}
