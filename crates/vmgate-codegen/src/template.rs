//! `{{NAME}}` placeholder substitution into the fixed C template (§4.2).

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// The fixed C template, embedded at compile time.
pub const VM_TEMPLATE: &str = include_str!("templates/vm_template.c");

/// One of the four substitution kinds the template uses.
#[derive(Debug, Clone)]
pub enum Placeholder {
    /// A C brace-initializer array literal, e.g. `{1, 2, 3}`.
    ArrayLiteral(Vec<u8>),
    /// A bare integer literal.
    IntLiteral(i64),
    /// A C string literal, with `"`/`\` escaped.
    CString(String),
    /// Inserted verbatim, unescaped: a call fragment or statement.
    Verbatim(String),
}

impl Placeholder {
    fn render(&self) -> String {
        match self {
            Placeholder::ArrayLiteral(bytes) => {
                let mut s = String::with_capacity(bytes.len() * 4 + 2);
                s.push('{');
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        s.push(',');
                    }
                    let _ = write!(s, "{b}");
                }
                s.push('}');
                s
            }
            Placeholder::IntLiteral(n) => n.to_string(),
            Placeholder::CString(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('"');
                for c in s.chars() {
                    match c {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        _ => out.push(c),
                    }
                }
                out.push('"');
                out
            }
            Placeholder::Verbatim(s) => s.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template references unknown placeholder {{{{{0}}}}}")]
    UnknownPlaceholder(String),
}

/// Substitute every `{{NAME}}` occurrence in `template` with the rendered
/// value from `values`. Every placeholder literally present in the
/// template must have a corresponding entry; unused entries in `values`
/// are ignored.
pub fn render(template: &str, values: &BTreeMap<&str, Placeholder>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| TemplateError::UnknownPlaceholder(after.to_string()))?;
        let name = &after[..end];
        let value = values
            .get(name)
            .ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
        out.push_str(&value.render());
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_literal_renders_as_brace_list() {
        let p = Placeholder::ArrayLiteral(vec![1, 2, 3]);
        assert_eq!(p.render(), "{1,2,3}");
    }

    #[test]
    fn cstring_escapes_quotes_and_backslashes() {
        let p = Placeholder::CString("a\"b\\c".to_string());
        assert_eq!(p.render(), "\"a\\\"b\\\\c\"");
    }

    #[test]
    fn render_substitutes_all_placeholders() {
        let mut values = BTreeMap::new();
        values.insert("FOO", Placeholder::IntLiteral(42));
        values.insert("BAR", Placeholder::Verbatim(";".to_string()));
        let out = render("int x = {{FOO}}; {{BAR}}", &values).unwrap();
        assert_eq!(out, "int x = 42; ;");
    }

    #[test]
    fn render_fails_on_missing_placeholder() {
        let values = BTreeMap::new();
        assert!(render("{{MISSING}}", &values).is_err());
    }

    #[test]
    fn real_template_renders_with_the_expected_keys() {
        let mut values = BTreeMap::new();
        values.insert("BUILD_TAG", Placeholder::CString("test-build".to_string()));
        values.insert("ACTION_COUNT", Placeholder::IntLiteral(19));
        values.insert("VM_TABLE", Placeholder::ArrayLiteral((0..=255u8).collect()));
        values.insert(
            "VM_INV_TABLE",
            Placeholder::ArrayLiteral((0..=255u8).collect()),
        );
        values.insert(
            "OPCODE_ACTION_TABLE",
            Placeholder::ArrayLiteral(vec![255u8; 256]),
        );
        values.insert("ENTRY_DISPATCH", Placeholder::Verbatim(String::new()));
        let rendered = render(VM_TEMPLATE, &values).unwrap();
        assert!(!rendered.contains("{{"));
    }
}
