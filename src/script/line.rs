//! Parsed script lines

use serde::Serialize;

/// Prefix marking a variable reference.
pub const VAR_PREFIX: char = '$';
/// Separator between a variable name and an attribute.
pub const ATTR_SEPARATOR: char = '.';
/// Prefix marking a comment line.
pub const COMMENT_PREFIX: char = '#';

/// One line of a keyword script after tokenizing.
///
/// `items` holds the keyword followed by its argument tokens, exactly as
/// written (quotes removed). The `as <var>` suffix is split off into
/// `output_var`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordLine {
    raw: String,
    line_number: usize,
    is_comment: bool,
    items: Vec<String>,
    output_var: Option<String>,
}

impl KeywordLine {
    pub(crate) fn new(
        raw: impl Into<String>,
        line_number: usize,
        items: Vec<String>,
        output_var: Option<String>,
    ) -> Self {
        Self {
            raw: raw.into(),
            line_number,
            is_comment: false,
            items,
            output_var,
        }
    }

    pub(crate) fn comment(raw: impl Into<String>, line_number: usize) -> Self {
        Self {
            raw: raw.into(),
            line_number,
            is_comment: true,
            items: Vec::new(),
            output_var: None,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn is_comment(&self) -> bool {
        self.is_comment
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Keyword name, the first token
    pub fn keyword(&self) -> Option<&str> {
        self.items.first().map(String::as_str)
    }

    /// Argument tokens, in order
    pub fn args(&self) -> &[String] {
        self.items.get(1..).unwrap_or(&[])
    }

    pub fn output_var(&self) -> Option<&str> {
        self.output_var.as_deref()
    }

    /// Variables this line reads, in order of appearance
    pub fn referenced_vars(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|token| match Arg::classify(token) {
            Arg::Var { name, .. } => Some(name),
            Arg::Literal(_) => None,
        })
    }
}

/// Classification of a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg<'a> {
    Literal(&'a str),
    Var { name: &'a str, attr: Option<&'a str> },
}

impl<'a> Arg<'a> {
    /// `$name` and `$name.attr` are variable references; everything else,
    /// including a lone `$`, is a literal.
    pub fn classify(token: &'a str) -> Self {
        match token.strip_prefix(VAR_PREFIX) {
            Some(rest) if !rest.is_empty() => match rest.split_once(ATTR_SEPARATOR) {
                Some((name, attr)) => Arg::Var {
                    name,
                    attr: Some(attr),
                },
                None => Arg::Var {
                    name: rest,
                    attr: None,
                },
            },
            _ => Arg::Literal(token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(Arg::classify("hello"), Arg::Literal("hello"));
        assert_eq!(Arg::classify("$"), Arg::Literal("$"));
        assert_eq!(Arg::classify(""), Arg::Literal(""));
        assert_eq!(
            Arg::classify("$v"),
            Arg::Var {
                name: "v",
                attr: None
            }
        );
        assert_eq!(
            Arg::classify("$v.text"),
            Arg::Var {
                name: "v",
                attr: Some("text")
            }
        );
        // Only the first dot separates.
        assert_eq!(
            Arg::classify("$v.a.b"),
            Arg::Var {
                name: "v",
                attr: Some("a.b")
            }
        );
    }

    #[test]
    fn test_accessors() {
        let line = KeywordLine::new(
            "call $obj getText as t",
            3,
            vec!["call".into(), "$obj".into(), "getText".into()],
            Some("t".into()),
        );
        assert_eq!(line.keyword(), Some("call"));
        assert_eq!(line.args(), ["$obj".to_string(), "getText".to_string()]);
        assert_eq!(line.output_var(), Some("t"));
        assert_eq!(line.referenced_vars().collect::<Vec<_>>(), vec!["obj"]);

        let comment = KeywordLine::comment("# note", 4);
        assert!(comment.is_comment());
        assert_eq!(comment.keyword(), None);
        assert!(comment.args().is_empty());
    }
}
