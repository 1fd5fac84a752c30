//! `{name}` placeholder substitution for step descriptions and command
//! arguments.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;

/// Variable substitution context.
///
/// Placeholders use the `{varname}` syntax. Unknown placeholders are left in
/// place so a description still reads sensibly when a config key is missing.
///
/// # Example
///
/// ```
/// use us_pipeline::TemplateContext;
///
/// let ctx = TemplateContext::new().with_var("bitrate", "320");
/// assert_eq!(ctx.substitute("Transcode at {bitrate}k"), "Transcode at 320k");
/// assert_eq!(ctx.substitute("{unknown}"), "{unknown}");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from the top-level keys of a step configuration.
    ///
    /// Strings are used as-is; other values use their compact JSON form.
    /// Non-object configurations contribute no variables.
    pub fn from_config(config: &Value) -> Self {
        let mut ctx = Self::new();
        if let Value::Object(map) = config {
            for (key, value) in map {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                ctx.vars.insert(key.clone(), rendered);
            }
        }
        ctx
    }

    /// Add the step's filesystem locations.
    ///
    /// - `{data}`: the step's data area
    /// - `{prev_data}`: the previous step's data area, when there is one
    pub fn with_paths(mut self, data: &Path, prev_data: Option<&Path>) -> Self {
        self.set("data", &data.display().to_string());
        if let Some(prev) = prev_data {
            self.set("prev_data", &prev.display().to_string());
        }
        self
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Substitute variables in a string in a single left-to-right pass.
    ///
    /// Substituted values are never re-scanned.
    pub fn substitute(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let key = &after[..close];
                    match self.vars.get(key) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(key);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    pub fn substitute_all(&self, templates: &[String]) -> Vec<String> {
        templates.iter().map(|t| self.substitute(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    #[test]
    fn test_from_config() {
        let ctx = TemplateContext::from_config(&json!({
            "format": "flac",
            "bitrate": 320,
            "normalize": true,
        }));

        assert_eq!(
            ctx.substitute("Encode {format} at {bitrate}k (normalize: {normalize})"),
            "Encode flac at 320k (normalize: true)"
        );
    }

    #[test]
    fn test_non_object_config_has_no_vars() {
        let ctx = TemplateContext::from_config(&json!([1, 2]));
        assert_eq!(ctx.substitute("{0}"), "{0}");
    }

    #[test]
    fn test_paths() {
        let ctx = TemplateContext::new().with_paths(
            &PathBuf::from("/media/p/step_2/data"),
            Some(&PathBuf::from("/media/p/step_1/data")),
        );

        assert_eq!(ctx.substitute("{prev_data}/in.wav"), "/media/p/step_1/data/in.wav");
        assert_eq!(ctx.substitute("{data}/out.flac"), "/media/p/step_2/data/out.flac");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let ctx = TemplateContext::new()
            .with_var("a", "{b}")
            .with_var("b", "nope");
        assert_eq!(ctx.substitute("{a}"), "{b}");
    }

    #[test]
    fn test_unbalanced_braces() {
        let ctx = TemplateContext::new().with_var("name", "test");
        assert_eq!(ctx.substitute("{name} {oops"), "test {oops");
        assert_eq!(ctx.substitute("} {name}"), "} test");
    }

    #[test]
    fn test_substitute_all() {
        let ctx = TemplateContext::new().with_var("name", "test");
        let templates = vec!["{name}.txt".to_string(), "{name}.log".to_string()];
        assert_eq!(ctx.substitute_all(&templates), vec!["test.txt", "test.log"]);
    }
}
