//! Rendering of `.tpl` migration files.
//!
//! Placeholders use `{NAME}` syntax and resolve against environment
//! variables. Values are inserted verbatim. A literal opening brace is
//! written as `\{`.

use std::collections::HashMap;

use stepwise_common::{Error, Result};
use tinytemplate::TinyTemplate;

/// Render `text` with the current process environment as context.
pub fn render_with_env(name: &str, text: &str) -> Result<String> {
    let env: HashMap<String, String> = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect();
    render(name, text, &env)
}

pub fn render(name: &str, text: &str, context: &HashMap<String, String>) -> Result<String> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template(name, text).map_err(|e| Error::Template {
        file: name.to_string(),
        message: e.to_string(),
    })?;
    tt.render(name, context).map_err(|e| Error::Template {
        file: name.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_placeholders_without_escaping() {
        let ctx = context(&[("SCHEMA", "app"), ("OWNER", "o'brien")]);
        let out = render(
            "t.up.sql.tpl",
            "CREATE SCHEMA {SCHEMA} AUTHORIZATION \"{OWNER}\";",
            &ctx,
        )
        .unwrap();
        assert_eq!(out, "CREATE SCHEMA app AUTHORIZATION \"o'brien\";");
    }

    #[test]
    fn unknown_placeholder_is_a_template_error() {
        let err = render("t.up.sql.tpl", "SELECT {MISSING};", &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::Template { .. }), "{err}");
    }

    #[test]
    fn escaped_braces_are_literal() {
        let out = render("t.up.sql.tpl", r"SELECT '\{}';", &HashMap::new()).unwrap();
        assert_eq!(out, "SELECT '{}';");
    }

    #[test]
    fn renders_from_process_environment() {
        let path = std::env::var("PATH").unwrap_or_default();
        let out = render_with_env("t.up.sql.tpl", "-- {PATH}").unwrap();
        assert_eq!(out, format!("-- {path}"));
    }
}
