//! The controlled device: perception and low-level commands.
//!
//! A Device knows how to describe what is on screen (element list, UI tree
//! dumps, screenshots) and how to execute low-level commands. Concrete
//! drivers live outside this workspace; the engine only talks to this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::DeviceError;

/// The operating system family of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOs {
    #[default]
    Android,
    Ios,
    Web,
}

impl DeviceOs {
    pub fn is_android(&self) -> bool {
        matches!(self, Self::Android)
    }
}

/// Screen-space rectangle of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }
}

/// A visible, interactable element on the current screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Position in the element list shown to the oracle
    pub index: usize,

    /// Visible text (may be empty)
    #[serde(default)]
    pub text: String,

    /// Resource / accessibility id, if the platform exposes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub bounds: Bounds,

    #[serde(default)]
    pub is_focused: bool,
}

impl Element {
    /// One-line description used in element listings.
    pub fn describe(&self) -> String {
        let mut line = format!("{}: ", self.index);
        if !self.text.is_empty() {
            line.push_str(&format!("text=\"{}\" ", self.text));
        }
        if let Some(id) = &self.id {
            line.push_str(&format!("id=\"{id}\" "));
        }
        let b = &self.bounds;
        line.push_str(&format!("bounds=[{},{}][{},{}]", b.left, b.top, b.right, b.bottom));
        if self.is_focused {
            line.push_str(" focused");
        }
        line
    }
}

/// Hardware / soft keys the engine can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCode {
    Enter,
    Back,
    Home,
    Backspace,
    Search,
    Tab,
    VolumeUp,
    VolumeDown,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    DpadCenter,
}

impl KeyCode {
    /// Parse a key name as the oracle writes it ("Enter", "enter", "DPAD_UP").
    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        let key = match normalized.as_str() {
            "enter" | "return" => Self::Enter,
            "back" => Self::Back,
            "home" => Self::Home,
            "backspace" | "delete" => Self::Backspace,
            "search" => Self::Search,
            "tab" => Self::Tab,
            "volumeup" => Self::VolumeUp,
            "volumedown" => Self::VolumeDown,
            "dpadup" => Self::DpadUp,
            "dpaddown" => Self::DpadDown,
            "dpadleft" => Self::DpadLeft,
            "dpadright" => Self::DpadRight,
            "dpadcenter" => Self::DpadCenter,
            _ => return None,
        };
        Some(key)
    }
}

/// Direction of a scroll gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// A low-level command executed by the device driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceCommand {
    TapOnText { text: String },
    TapOnId { id: String },
    TapOnPoint { x: i32, y: i32 },
    InputText { text: String },
    PressKey { key: KeyCode },
    Back,
    Scroll { direction: ScrollDirection },
    /// Move focus until an element matching the selector is focused (TV).
    FocusOnText { text: String },
    FocusOnId { id: String },
    FocusOnPoint { x: i32, y: i32 },
    WaitMillis { millis: u64 },
    LaunchApp { app_id: String },
    StopApp { app_id: String },
    ClearAppData { app_id: String },
    OpenLink { url: String },
}

impl DeviceCommand {
    /// Short name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TapOnText { .. } => "tap_on_text",
            Self::TapOnId { .. } => "tap_on_id",
            Self::TapOnPoint { .. } => "tap_on_point",
            Self::InputText { .. } => "input_text",
            Self::PressKey { .. } => "press_key",
            Self::Back => "back",
            Self::Scroll { .. } => "scroll",
            Self::FocusOnText { .. } => "focus_on_text",
            Self::FocusOnId { .. } => "focus_on_id",
            Self::FocusOnPoint { .. } => "focus_on_point",
            Self::WaitMillis { .. } => "wait",
            Self::LaunchApp { .. } => "launch_app",
            Self::StopApp { .. } => "stop_app",
            Self::ClearAppData { .. } => "clear_app_data",
            Self::OpenLink { .. } => "open_link",
        }
    }
}

/// The core Device trait.
///
/// One device handle is shared by every task of a scenario chain, so side
/// effects of an earlier task are visible to the next one.
#[async_trait]
pub trait Device: Send + Sync {
    /// Interactable elements on the current screen.
    async fn elements(&self) -> std::result::Result<Vec<Element>, DeviceError>;

    /// Full UI tree as text.
    async fn view_tree_string(&self) -> std::result::Result<String, DeviceError>;

    /// UI tree of the focused window / element only.
    async fn focused_tree_string(&self) -> std::result::Result<String, DeviceError>;

    /// Capture a screenshot into `path`.
    async fn screenshot(&self, path: &Path) -> std::result::Result<(), DeviceError>;

    /// Execute commands in order, stopping at the first failure.
    async fn execute_commands(&self, commands: &[DeviceCommand]) -> std::result::Result<(), DeviceError>;

    /// Block until the foreground app stops changing.
    async fn wait_for_app_to_settle(&self, app_id: Option<&str>) -> std::result::Result<(), DeviceError>;

    fn os(&self) -> DeviceOs;

    async fn close(&self);

    fn is_closed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_center() {
        let b = Bounds::new(0, 100, 200, 300);
        assert_eq!(b.center(), (100, 200));
    }

    #[test]
    fn key_code_parsing_is_lenient() {
        assert_eq!(KeyCode::parse("Enter"), Some(KeyCode::Enter));
        assert_eq!(KeyCode::parse("DPAD_UP"), Some(KeyCode::DpadUp));
        assert_eq!(KeyCode::parse("volume up"), Some(KeyCode::VolumeUp));
        assert_eq!(KeyCode::parse("hyperspace"), None);
    }

    #[test]
    fn element_description_includes_text_id_and_bounds() {
        let e = Element {
            index: 3,
            text: "Login".into(),
            id: Some("btn_login".into()),
            bounds: Bounds::new(10, 20, 30, 40),
            is_focused: true,
        };
        let line = e.describe();
        assert!(line.starts_with("3: "));
        assert!(line.contains("text=\"Login\""));
        assert!(line.contains("id=\"btn_login\""));
        assert!(line.contains("[10,20][30,40]"));
        assert!(line.ends_with("focused"));
    }

    #[test]
    fn device_command_serializes_with_type_tag() {
        let cmd = DeviceCommand::TapOnText { text: "OK".into() };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains(r#""type":"tap_on_text""#));
        assert_eq!(cmd.name(), "tap_on_text");
    }
}
