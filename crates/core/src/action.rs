//! The closed set of actions the agent can take.
//!
//! [`ActionKind`] is the tag the oracle names; [`Action`] is the validated,
//! fully-typed command carrying its arguments. Turning oracle output into an
//! `Action` is the dispatcher's job; turning an `Action` into
//! [`DeviceCommand`]s happens here.

use serde::{Deserialize, Serialize};
use std::fmt;
use crate::device::{DeviceCommand, Element, KeyCode, ScrollDirection};
use crate::error::ActionValidationError;

/// What kind of argument an action takes from the oracle's `text` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    None,
    /// Required, non-empty text.
    Text,
    /// Integer parsed from text, falling back to `default`, at most `max`.
    Number { default: u64, max: u64 },
    /// Element index, bounds-checked against the current screen.
    Index,
}

/// Default repeat count for D-pad presses.
pub const DEFAULT_DPAD_TIMES: u64 = 1;
/// Upper bound on D-pad presses per action.
pub const MAX_DPAD_TIMES: u64 = 50;
/// Default wait duration in milliseconds.
pub const DEFAULT_WAIT_MILLIS: u64 = 1000;
/// Upper bound on a single wait.
pub const MAX_WAIT_MILLIS: u64 = 60_000;
/// Index used when the oracle's index text is not a number.
pub const DEFAULT_ELEMENT_INDEX: u64 = 0;

/// Tag of every built-in action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    ClickWithText,
    ClickWithId,
    ClickWithIndex,
    InputText,
    BackPress,
    KeyPress,
    Scroll,
    Wait,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    DpadCenter,
    DpadAutoFocusWithText,
    DpadAutoFocusWithId,
    DpadAutoFocusWithIndex,
    GoalAchieved,
    Failed,
}

impl ActionKind {
    /// Every built-in action, in presentation order.
    pub const ALL: [ActionKind; 18] = [
        Self::ClickWithText,
        Self::ClickWithId,
        Self::ClickWithIndex,
        Self::InputText,
        Self::BackPress,
        Self::KeyPress,
        Self::Scroll,
        Self::Wait,
        Self::DpadUp,
        Self::DpadDown,
        Self::DpadLeft,
        Self::DpadRight,
        Self::DpadCenter,
        Self::DpadAutoFocusWithText,
        Self::DpadAutoFocusWithId,
        Self::DpadAutoFocusWithIndex,
        Self::GoalAchieved,
        Self::Failed,
    ];

    /// Actions every task may use without opting in.
    pub const DEFAULTS: [ActionKind; 10] = [
        Self::ClickWithText,
        Self::ClickWithId,
        Self::ClickWithIndex,
        Self::InputText,
        Self::BackPress,
        Self::KeyPress,
        Self::Scroll,
        Self::Wait,
        Self::GoalAchieved,
        Self::Failed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ClickWithText => "ClickWithText",
            Self::ClickWithId => "ClickWithId",
            Self::ClickWithIndex => "ClickWithIndex",
            Self::InputText => "InputText",
            Self::BackPress => "BackPress",
            Self::KeyPress => "KeyPress",
            Self::Scroll => "Scroll",
            Self::Wait => "Wait",
            Self::DpadUp => "DpadUp",
            Self::DpadDown => "DpadDown",
            Self::DpadLeft => "DpadLeft",
            Self::DpadRight => "DpadRight",
            Self::DpadCenter => "DpadCenter",
            Self::DpadAutoFocusWithText => "DpadAutoFocusWithText",
            Self::DpadAutoFocusWithId => "DpadAutoFocusWithId",
            Self::DpadAutoFocusWithIndex => "DpadAutoFocusWithIndex",
            Self::GoalAchieved => "GoalAchieved",
            Self::Failed => "Failed",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    pub fn argument(&self) -> ArgumentKind {
        match self {
            Self::ClickWithText
            | Self::ClickWithId
            | Self::InputText
            | Self::KeyPress
            | Self::DpadAutoFocusWithText
            | Self::DpadAutoFocusWithId => ArgumentKind::Text,
            Self::ClickWithIndex | Self::DpadAutoFocusWithIndex => ArgumentKind::Index,
            Self::Wait => ArgumentKind::Number {
                default: DEFAULT_WAIT_MILLIS,
                max: MAX_WAIT_MILLIS,
            },
            Self::DpadUp | Self::DpadDown | Self::DpadLeft | Self::DpadRight | Self::DpadCenter => {
                ArgumentKind::Number {
                    default: DEFAULT_DPAD_TIMES,
                    max: MAX_DPAD_TIMES,
                }
            }
            Self::BackPress | Self::Scroll | Self::GoalAchieved | Self::Failed => ArgumentKind::None,
        }
    }

    /// Instruction shown to the oracle for this action.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ClickWithText => "Click the element whose visible text equals `text`.",
            Self::ClickWithId => "Click the element whose id equals `text`.",
            Self::ClickWithIndex => "Click the element with index `text` from the element list.",
            Self::InputText => "Type `text` into the focused field.",
            Self::BackPress => "Press the back button.",
            Self::KeyPress => "Press the key named by `text` (e.g. Enter, Home, Search).",
            Self::Scroll => "Scroll the screen; `text` may be \"up\" or \"down\" (default down).",
            Self::Wait => "Wait for `text` milliseconds.",
            Self::DpadUp => "Press D-pad up `text` times.",
            Self::DpadDown => "Press D-pad down `text` times.",
            Self::DpadLeft => "Press D-pad left `text` times.",
            Self::DpadRight => "Press D-pad right `text` times.",
            Self::DpadCenter => "Press D-pad center `text` times.",
            Self::DpadAutoFocusWithText => "Move D-pad focus to the element with text `text`.",
            Self::DpadAutoFocusWithId => "Move D-pad focus to the element with id `text`.",
            Self::DpadAutoFocusWithIndex => "Move D-pad focus to the element with index `text`.",
            Self::GoalAchieved => "Declare that the goal has been achieved.",
            Self::Failed => "Declare that the goal cannot be achieved.",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// D-pad button for the repeatable D-pad actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DpadKey {
    Up,
    Down,
    Left,
    Right,
    Center,
}

impl DpadKey {
    fn key_code(&self) -> KeyCode {
        match self {
            Self::Up => KeyCode::DpadUp,
            Self::Down => KeyCode::DpadDown,
            Self::Left => KeyCode::DpadLeft,
            Self::Right => KeyCode::DpadRight,
            Self::Center => KeyCode::DpadCenter,
        }
    }

    fn kind(&self) -> ActionKind {
        match self {
            Self::Up => ActionKind::DpadUp,
            Self::Down => ActionKind::DpadDown,
            Self::Left => ActionKind::DpadLeft,
            Self::Right => ActionKind::DpadRight,
            Self::Center => ActionKind::DpadCenter,
        }
    }
}

/// A validated action with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    ClickWithText { text: String },
    ClickWithId { id: String },
    ClickWithIndex { index: usize },
    InputText { text: String },
    BackPress,
    KeyPress { key: KeyCode },
    Scroll { direction: ScrollDirection },
    Wait { millis: u64 },
    Dpad { key: DpadKey, times: u64 },
    DpadAutoFocusWithText { text: String },
    DpadAutoFocusWithId { id: String },
    DpadAutoFocusWithIndex { index: usize },
    /// Call an external tool by name with the given arguments.
    ExecuteTool { name: String, arguments: serde_json::Value },
    GoalAchieved,
    Failed,
}

impl Action {
    /// The built-in kind, or `None` for external tool calls.
    pub fn kind(&self) -> Option<ActionKind> {
        let kind = match self {
            Self::ClickWithText { .. } => ActionKind::ClickWithText,
            Self::ClickWithId { .. } => ActionKind::ClickWithId,
            Self::ClickWithIndex { .. } => ActionKind::ClickWithIndex,
            Self::InputText { .. } => ActionKind::InputText,
            Self::BackPress => ActionKind::BackPress,
            Self::KeyPress { .. } => ActionKind::KeyPress,
            Self::Scroll { .. } => ActionKind::Scroll,
            Self::Wait { .. } => ActionKind::Wait,
            Self::Dpad { key, .. } => key.kind(),
            Self::DpadAutoFocusWithText { .. } => ActionKind::DpadAutoFocusWithText,
            Self::DpadAutoFocusWithId { .. } => ActionKind::DpadAutoFocusWithId,
            Self::DpadAutoFocusWithIndex { .. } => ActionKind::DpadAutoFocusWithIndex,
            Self::ExecuteTool { .. } => return None,
            Self::GoalAchieved => ActionKind::GoalAchieved,
            Self::Failed => ActionKind::Failed,
        };
        Some(kind)
    }

    pub fn name(&self) -> String {
        match self {
            Self::ExecuteTool { name, .. } => format!("tool:{name}"),
            other => other
                .kind()
                .map(|k| k.name().to_string())
                .unwrap_or_default(),
        }
    }

    /// `GoalAchieved` and `Failed` end the task without touching the device.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GoalAchieved | Self::Failed)
    }

    /// Marker actions do not count as meaningful progress.
    pub fn is_failure_marker(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Translate into device commands.
    ///
    /// Terminal actions and tool calls produce no device commands.
    pub fn to_commands(&self, elements: &[Element]) -> Result<Vec<DeviceCommand>, ActionValidationError> {
        let element_at = |index: usize| {
            elements
                .iter()
                .find(|e| e.index == index)
                .ok_or(ActionValidationError::IndexOutOfBounds {
                    index,
                    count: elements.len(),
                })
        };

        if let Some(ArgumentKind::Number { max, .. }) = self.kind().map(|k| k.argument()) {
            let value = match self {
                Self::Wait { millis } => *millis,
                Self::Dpad { times, .. } => *times,
                _ => 0,
            };
            if value > max {
                return Err(ActionValidationError::InvalidArgument {
                    action: self.name(),
                    argument: "text".into(),
                    reason: format!("{value} exceeds the limit of {max}"),
                });
            }
        }

        let commands = match self {
            Self::ClickWithText { text } => vec![DeviceCommand::TapOnText { text: text.clone() }],
            Self::ClickWithId { id } => vec![DeviceCommand::TapOnId { id: id.clone() }],
            Self::ClickWithIndex { index } => {
                let (x, y) = element_at(*index)?.bounds.center();
                vec![DeviceCommand::TapOnPoint { x, y }]
            }
            Self::InputText { text } => vec![DeviceCommand::InputText { text: text.clone() }],
            Self::BackPress => vec![DeviceCommand::Back],
            Self::KeyPress { key } => vec![DeviceCommand::PressKey { key: *key }],
            Self::Scroll { direction } => vec![DeviceCommand::Scroll { direction: *direction }],
            Self::Wait { millis } => vec![DeviceCommand::WaitMillis { millis: *millis }],
            Self::Dpad { key, times } => (0..*times)
                .map(|_| DeviceCommand::PressKey { key: key.key_code() })
                .collect(),
            Self::DpadAutoFocusWithText { text } => {
                vec![DeviceCommand::FocusOnText { text: text.clone() }]
            }
            Self::DpadAutoFocusWithId { id } => vec![DeviceCommand::FocusOnId { id: id.clone() }],
            Self::DpadAutoFocusWithIndex { index } => {
                let (x, y) = element_at(*index)?.bounds.center();
                vec![DeviceCommand::FocusOnPoint { x, y }]
            }
            Self::ExecuteTool { .. } | Self::GoalAchieved | Self::Failed => vec![],
        };
        Ok(commands)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClickWithText { text } => write!(f, "ClickWithText(text={text})"),
            Self::ClickWithId { id } => write!(f, "ClickWithId(id={id})"),
            Self::ClickWithIndex { index } => write!(f, "ClickWithIndex(index={index})"),
            Self::InputText { text } => write!(f, "InputText(text={text})"),
            Self::BackPress => f.write_str("BackPress"),
            Self::KeyPress { key } => write!(f, "KeyPress(key={key:?})"),
            Self::Scroll { direction } => write!(f, "Scroll(direction={direction:?})"),
            Self::Wait { millis } => write!(f, "Wait(millis={millis})"),
            Self::Dpad { key, times } => write!(f, "{}(times={times})", key.kind().name()),
            Self::DpadAutoFocusWithText { text } => write!(f, "DpadAutoFocusWithText(text={text})"),
            Self::DpadAutoFocusWithId { id } => write!(f, "DpadAutoFocusWithId(id={id})"),
            Self::DpadAutoFocusWithIndex { index } => {
                write!(f, "DpadAutoFocusWithIndex(index={index})")
            }
            Self::ExecuteTool { name, arguments } => write!(f, "ExecuteTool({name}, {arguments})"),
            Self::GoalAchieved => f.write_str("GoalAchieved"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}
