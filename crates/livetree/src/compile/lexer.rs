//! Expression lexing
//!
//! Splits expression text into literal text and `${...}` bodies, a body
//! into its main part and `:-` fallback, and operator arguments into
//! tokens. Inside a body, nested `${...}` and double-quoted spans are
//! opaque to every split.

use crate::error::ParseError;

/// A run of an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Piece {
    /// Literal text, escapes already applied
    Text(String),
    /// The body of a `${...}`, verbatim
    Inner(String),
}

/// One operator argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    /// Token text, without surrounding quotes
    pub text: String,
    /// Whether the token was written in double quotes
    pub quoted: bool,
}

fn opens_at(bytes: &[u8], i: usize) -> bool {
    bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{')
}

/// Byte index of the `}` closing a `${` whose body starts at `from`.
fn find_close(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut quoted = false;
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'"' => quoted = !quoted,
            _ if !quoted && opens_at(bytes, i) => {
                depth += 1;
                i += 2;
                continue;
            }
            b'}' if !quoted => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split expression text into literal runs and `${...}` bodies.
///
/// `\$` and `\\` escape; any other backslash is literal.
pub(crate) fn split_template(input: &str) -> Result<Vec<Piece>, ParseError> {
    let bytes = input.as_bytes();
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while let Some(ch) = input[i..].chars().next() {
        match ch {
            '\\' => match bytes.get(i + 1).copied() {
                Some(next) if next == b'$' || next == b'\\' => {
                    text.push(next as char);
                    i += 2;
                }
                _ => {
                    text.push('\\');
                    i += 1;
                }
            },
            '$' if opens_at(bytes, i) => {
                let start = i + 2;
                let end = find_close(input, start)
                    .ok_or_else(|| ParseError::new("unterminated `${`"))?;
                if !text.is_empty() {
                    pieces.push(Piece::Text(std::mem::take(&mut text)));
                }
                pieces.push(Piece::Inner(input[start..end].to_string()));
                i = end + 1;
            }
            _ => {
                text.push(ch);
                i += ch.len_utf8();
            }
        }
    }

    if !text.is_empty() {
        pieces.push(Piece::Text(text));
    }
    Ok(pieces)
}

/// Split a body at its top-level `:-` into main part and fallback.
pub(crate) fn split_fallback(inner: &str) -> (&str, Option<&str>) {
    let bytes = inner.as_bytes();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'"' => quoted = !quoted,
            _ if !quoted && opens_at(bytes, i) => {
                depth += 1;
                i += 2;
                continue;
            }
            b'}' if !quoted && depth > 0 => depth -= 1,
            b':' if !quoted && depth == 0 && bytes.get(i + 1) == Some(&b'-') => {
                return (&inner[..i], Some(&inner[i + 2..]));
            }
            _ => {}
        }
        i += 1;
    }
    (inner, None)
}

/// Split a body into its head word and the rest.
pub(crate) fn split_head(body: &str) -> (&str, &str) {
    let body = body.trim();
    match body.find(char::is_whitespace) {
        Some(at) => (&body[..at], body[at..].trim_start()),
        None => (body, ""),
    }
}

/// Split operator arguments into whitespace-separated tokens.
///
/// A `${...}` is part of the token it appears in, spaces and all. A token
/// starting with `"` runs to the next unescaped `"`; `\"` inside it is a
/// literal quote.
pub(crate) fn split_args(args: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = args.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        if bytes[i] == b'"' {
            let (text, end) = quoted_span(args, i + 1)?;
            tokens.push(Token { text, quoted: true });
            i = end + 1;
            continue;
        }

        let start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
            if bytes[i] == b'\\' {
                i += 2;
            } else if opens_at(bytes, i) {
                let end = find_close(args, i + 2)
                    .ok_or_else(|| ParseError::new("unterminated `${`"))?;
                i = end + 1;
            } else {
                i += 1;
            }
        }
        let end = i.min(bytes.len());
        tokens.push(Token {
            text: args[start..end].to_string(),
            quoted: false,
        });
    }
    Ok(tokens)
}

/// Contents of a quoted span starting at `from`, and the byte index of the
/// closing quote.
fn quoted_span(args: &str, from: usize) -> Result<(String, usize), ParseError> {
    let bytes = args.as_bytes();
    let mut text = String::new();
    let mut i = from;
    while let Some(ch) = args[i..].chars().next() {
        match ch {
            '"' => return Ok((text, i)),
            '\\' if bytes.get(i + 1) == Some(&b'"') => {
                text.push('"');
                i += 2;
            }
            _ => {
                text.push(ch);
                i += ch.len_utf8();
            }
        }
    }
    Err(ParseError::new("unterminated quote"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> Piece {
        Piece::Text(s.to_string())
    }

    fn inner(s: &str) -> Piece {
        Piece::Inner(s.to_string())
    }

    #[test]
    fn test_template_plain_text() {
        assert_eq!(split_template("hello").unwrap(), vec![text("hello")]);
        assert_eq!(split_template("").unwrap(), Vec::<Piece>::new());
    }

    #[test]
    fn test_template_mixed() {
        assert_eq!(
            split_template("a${b}c${d.e}").unwrap(),
            vec![text("a"), inner("b"), text("c"), inner("d.e")]
        );
    }

    #[test]
    fn test_template_nested() {
        assert_eq!(
            split_template("${env ${name}}!").unwrap(),
            vec![inner("env ${name}"), text("!")]
        );
    }

    #[test]
    fn test_template_escapes() {
        assert_eq!(
            split_template(r"cost \${price} \\ c:\tmp").unwrap(),
            vec![text(r"cost ${price} \ c:\tmp")]
        );
    }

    #[test]
    fn test_template_unterminated() {
        assert!(split_template("${a").is_err());
        assert!(split_template("x ${env ${a}").is_err());
    }

    #[test]
    fn test_fallback_split_top_level_only() {
        assert_eq!(split_fallback("a:-b"), ("a", Some("b")));
        assert_eq!(split_fallback("a:-${b:-c}"), ("a", Some("${b:-c}")));
        assert_eq!(split_fallback("env ${x:-y}"), ("env ${x:-y}", None));
        assert_eq!(split_fallback(r#"cmd echo "a:-b""#), (r#"cmd echo "a:-b""#, None));
        assert_eq!(split_fallback("map 0:1 0:1 ${v}"), ("map 0:1 0:1 ${v}", None));
    }

    #[test]
    fn test_head_split() {
        assert_eq!(split_head(" map 1 2 3 "), ("map", "1 2 3"));
        assert_eq!(split_head("a.b"), ("a.b", ""));
    }

    #[test]
    fn test_args_tokens() {
        let tokens = split_args(r#"0:10 "a b \"c\"" ${env HOME} x${y z}w"#).unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["0:10", r#"a b "c""#, "${env HOME}", "x${y z}w"]);
        assert!(tokens[1].quoted);
        assert!(!tokens[2].quoted);
    }

    #[test]
    fn test_args_unterminated_quote() {
        assert!(split_args(r#"1 "abc"#).is_err());
    }
}
