//! Line tokenizer
//!
//! Tokens are separated by single spaces; runs of spaces produce no empty
//! tokens. A double-quoted span keeps its spaces and always yields a token,
//! even when empty. The quote characters themselves are dropped. An
//! unquoted `as` splits off the output variable.

use super::error::ParseError;
use super::line::{KeywordLine, COMMENT_PREFIX, VAR_PREFIX};

/// Keyword binding the result to a variable.
pub const AS: &str = "as";

const QUOTE: char = '"';
const SPACE: char = ' ';

#[derive(Debug)]
struct Token {
    text: String,
    quoted: bool,
}

/// Split one raw line into tokens.
fn split_tokens(raw: &str, line_number: usize) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut current: Option<Token> = None;
    let mut in_quote = false;

    for ch in raw.chars() {
        match ch {
            SPACE if !in_quote => {
                if let Some(token) = current.take() {
                    tokens.push(token);
                }
            }
            QUOTE => {
                in_quote = !in_quote;
                current
                    .get_or_insert_with(|| Token {
                        text: String::new(),
                        quoted: false,
                    })
                    .quoted = true;
            }
            _ => current
                .get_or_insert_with(|| Token {
                    text: String::new(),
                    quoted: false,
                })
                .text
                .push(ch),
        }
    }

    if in_quote {
        return Err(ParseError::UnterminatedQuote { line: line_number });
    }
    tokens.extend(current);
    Ok(tokens)
}

/// Tokenize a non-blank line.
///
/// Comment lines (first non-space character `#`) are returned with no
/// items. Name resolution is left to the interpreter.
pub fn tokenize(raw: &str, line_number: usize) -> Result<KeywordLine, ParseError> {
    if raw.trim_start().starts_with(COMMENT_PREFIX) {
        return Ok(KeywordLine::comment(raw, line_number));
    }

    let mut tokens = split_tokens(raw, line_number)?;

    let malformed = |reason: &str| ParseError::MalformedAsBinding {
        line: line_number,
        reason: reason.to_string(),
    };

    let output_var = match tokens.iter().position(|t| !t.quoted && t.text == AS) {
        None => None,
        Some(0) => return Err(malformed("missing keyword before \"as\"")),
        Some(pos) if pos + 1 == tokens.len() => {
            return Err(malformed("missing variable name after \"as\""))
        }
        Some(pos) if pos + 2 < tokens.len() => {
            return Err(malformed("only one variable may follow \"as\""))
        }
        Some(pos) => {
            let var = tokens.pop().map(|t| t.text).unwrap_or_default();
            tokens.truncate(pos);
            if var.is_empty() || var.starts_with(VAR_PREFIX) {
                return Err(malformed("variable name must be a bare identifier"));
            }
            Some(var)
        }
    };

    let items = tokens.into_iter().map(|t| t.text).collect();
    Ok(KeywordLine::new(raw, line_number, items, output_var))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(raw: &str) -> Vec<String> {
        tokenize(raw, 1).unwrap().items().to_vec()
    }

    #[test]
    fn test_plain_tokens() {
        assert_eq!(items("click_id ok_button"), vec!["click_id", "ok_button"]);
        // Extra spaces collapse.
        assert_eq!(items("  click_id   ok_button "), vec!["click_id", "ok_button"]);
    }

    #[test]
    fn test_quoted_span() {
        assert_eq!(
            items(r#"input_text "hello world"  x"#),
            vec!["input_text", "hello world", "x"]
        );
        assert_eq!(items(r#"input_text """#), vec!["input_text", ""]);
        assert_eq!(items(r#"a"b c"d"#), vec!["ab cd"]);
    }

    #[test]
    fn test_output_binding() {
        let line = tokenize(r#"click_id "com.app:id/x" as v"#, 5).unwrap();
        assert_eq!(line.items(), ["click_id".to_string(), "com.app:id/x".to_string()]);
        assert_eq!(line.output_var(), Some("v"));
        assert_eq!(line.line_number(), 5);
    }

    #[test]
    fn test_quoted_as_is_literal() {
        let line = tokenize(r#"input_text "as" x"#, 1).unwrap();
        assert_eq!(line.items(), ["input_text", "as", "x"].map(String::from));
        assert_eq!(line.output_var(), None);
    }

    #[test]
    fn test_malformed_bindings() {
        for raw in ["kw a as", "kw as a b", "as v", "kw as $v"] {
            match tokenize(raw, 9) {
                Err(ParseError::MalformedAsBinding { line, .. }) => assert_eq!(line, 9),
                other => panic!("{:?} parsed as {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(
            tokenize(r#"input_text "oops"#, 4).unwrap_err(),
            ParseError::UnterminatedQuote { line: 4 }
        );
        // The open quote wins over the dangling binding.
        assert_eq!(
            tokenize(r#"wait 1000 as ""#, 2).unwrap_err(),
            ParseError::UnterminatedQuote { line: 2 }
        );
    }

    #[test]
    fn test_comment_line() {
        let line = tokenize("   # click_id \"unbalanced", 2).unwrap();
        assert!(line.is_comment());
        assert!(line.items().is_empty());
    }
}
