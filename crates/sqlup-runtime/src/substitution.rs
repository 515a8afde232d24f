//! `$Name$` placeholder substitution.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use sqlup_core::config::VariableMode;
use sqlup_core::error::{Result, SqlupError};

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\$").expect("placeholder pattern is valid")
    })
}

/// Replace every `$Name$` in `text` with its configured value.
///
/// `script` is only used to attribute an [`SqlupError::UndefinedVariable`].
pub fn substitute(
    script: &str,
    text: &str,
    variables: &BTreeMap<String, String>,
    mode: VariableMode,
) -> Result<String> {
    if mode == VariableMode::Disabled {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in placeholder().captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        out.push_str(&text[last..whole.start()]);
        match variables.get(name.as_str()) {
            Some(value) => out.push_str(value),
            None if mode == VariableMode::Lenient => out.push_str(whole.as_str()),
            None => {
                return Err(SqlupError::UndefinedVariable {
                    script: script.to_string(),
                    name: name.as_str().to_string(),
                })
            }
        }
        last = whole.end();
    }
    out.push_str(&text[last..]);

    Ok(out)
}
