//! Command templating for job submission.
//!
//! Job commands may embed `{{key}}` placeholders that are filled from the
//! caller-supplied parameter object at submission time. Unknown
//! placeholders are left untouched so a remote-side templating pass can
//! still resolve them.

use serde_json::Value;

/// Render `{{key}}` placeholders in `input` from `params`.
///
/// String values are substituted verbatim; other JSON values use their
/// compact JSON rendering. A non-object `params` leaves the input
/// unchanged.
pub fn render(input: &str, params: &Value) -> String {
    let Some(map) = params.as_object() else {
        return input.to_string();
    };

    let mut out = input.to_string();
    for (key, value) in map {
        let placeholder = format!("{{{{{key}}}}}");
        if !out.contains(&placeholder) {
            continue;
        }
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out = out.replace(&placeholder, &rendered);
    }
    out
}
