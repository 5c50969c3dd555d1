//! `{{name}}` substitution in scenario goals.

use std::collections::BTreeMap;
use super::TOKEN;

/// Substitute `{{name}}` tokens with values from `variables`.
///
/// Unknown tokens are left as they are. `\{{name}}` renders as the literal
/// `{{name}}` and is never substituted.
pub fn resolve(text: &str, variables: Option<&BTreeMap<String, String>>) -> String {
    let Some(variables) = variables.filter(|v| !v.is_empty()) else {
        return text.to_string();
    };

    TOKEN
        .replace_all(text, |caps: &regex_lite::Captures<'_>| {
            let name = &caps[2];
            if caps.get(1).is_some() {
                return format!("{{{{{name}}}}}");
            }
            match variables.get(name) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
