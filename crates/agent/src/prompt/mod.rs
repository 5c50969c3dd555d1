//! Prompt construction: goal variables and the step prompt template.

pub mod template;
pub mod variables;

pub use template::{DEFAULT_TEMPLATE, PromptInput, PromptTemplate};
pub use variables::resolve;

use regex_lite::Regex;
use std::sync::LazyLock;

/// `{{NAME}}`, optionally preceded by a backslash escape.
pub(crate) static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\\)?\{\{([A-Za-z0-9_]+)\}\}").expect("token pattern is valid")
});

/// Any `{{...}}` brace token, well-formed or not; used to validate templates.
pub(crate) static ANY_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\\)?\{\{([^}]*)\}\}").expect("token pattern is valid")
});
