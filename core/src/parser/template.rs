//! Printf-style body templates for delimited input

/// Render a `data-template` against the whitespace tokens of one input line.
///
/// `%s` consumes the next token, `%%` emits a literal `%`. A `%s` with no
/// token left stays in the output verbatim, so a template with no tokens at
/// all passes through unchanged.
pub fn render(template: &str, tokens: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut next_token = tokens.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('s') => {
                chars.next();
                match next_token.next() {
                    Some(token) => out.push_str(token),
                    None => out.push_str("%s"),
                }
            }
            _ => out.push('%'),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutes_tokens_in_order() {
        assert_eq!(render("%s %s", &["123", "456"]), "123 456");
        assert_eq!(render("value: %s", &["123"]), "value: 123");
    }

    #[test]
    fn test_percent_escape() {
        assert_eq!(render("%s %%s", &["123"]), "123 %s");
        assert_eq!(render("100%%", &[]), "100%");
    }

    #[test]
    fn test_missing_tokens_leave_placeholder() {
        assert_eq!(render("%s", &[]), "%s");
        assert_eq!(render("{\"a\": %s, \"b\": %s}", &["1"]), "{\"a\": 1, \"b\": %s}");
    }

    #[test]
    fn test_lone_percent_passes_through() {
        assert_eq!(render("50% off", &[]), "50% off");
    }
}
