//! Query tokenization on top of `sqlparser`'s tokenizer.
//!
//! The raw token stream is collapsed into [`Tok`]s: whitespace and comments
//! disappear (recorded as `space_before`), and every placeholder spelling
//! (`?`, `?NNN`, `:name`, `@name`, `$name`) becomes a single
//! [`TokKind::Placeholder`].

use sqlparser::dialect::SQLiteDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Word};

/// Largest `?NNN` index SQLite accepts by default.
pub const MAX_PLACEHOLDER_INDEX: usize = 32766;

/// A placeholder as written in the query text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// Bare `?`.
    Positional,
    /// `?NNN`, 1-based.
    Numbered(usize),
    /// `:name`, `@name` or `$name`, stored without the prefix.
    Named(String),
}

impl Placeholder {
    pub fn form(&self) -> &'static str {
        match self {
            Placeholder::Positional => "positional '?'",
            Placeholder::Numbered(_) => "numbered '?NNN'",
            Placeholder::Named(_) => "named",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    Word {
        /// Identifier text without quotes.
        value: String,
        quoted: bool,
        /// Unquoted SQLite clause or expression keyword, never a column.
        keyword: bool,
    },
    Placeholder(Placeholder),
    Comma,
    Period,
    LParen,
    RParen,
    Star,
    Semicolon,
    Literal,
    Other,
}

/// One significant token.
#[derive(Debug, Clone, PartialEq)]
pub struct Tok {
    pub kind: TokKind,
    /// Source spelling, used to rebuild normalized SQL.
    pub text: String,
    pub space_before: bool,
}

impl Tok {
    /// Returns `true` for an unquoted word spelled `kw` (any case).
    pub fn is_kw(&self, kw: &str) -> bool {
        matches!(&self.kind, TokKind::Word { value, quoted: false, .. } if value.eq_ignore_ascii_case(kw))
    }

    /// The word's identifier text, quoted or not.
    pub fn word(&self) -> Option<&str> {
        match &self.kind {
            TokKind::Word { value, .. } => Some(value),
            _ => None,
        }
    }

    /// An unquoted word that belongs to the reserved clause/operator set.
    pub fn is_reserved(&self) -> bool {
        matches!(&self.kind, TokKind::Word { value, quoted: false, .. } if is_reserved(value))
    }

    /// Whether this token can end an operand, so that a following bare word
    /// is an implicit alias.
    pub fn ends_operand(&self) -> bool {
        match &self.kind {
            TokKind::Word { quoted: true, .. } => true,
            TokKind::Word { value, .. } => {
                !is_reserved(value) || OPERAND_KEYWORDS.iter().any(|k| value.eq_ignore_ascii_case(k))
            }
            TokKind::RParen | TokKind::Literal | TokKind::Placeholder(_) => true,
            _ => false,
        }
    }

    pub fn is(&self, kind: &TokKind) -> bool {
        std::mem::discriminant(&self.kind) == std::mem::discriminant(kind)
    }
}

/// Clause keywords and expression operators. A bare word from this set is
/// never an implicit alias.
const RESERVED: &[&str] = &[
    "ABORT", "ALL", "AND", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "COLLATE", "CONFLICT",
    "CROSS", "CURRENT", "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "DEFAULT", "DELETE",
    "DESC", "DISTINCT", "DO", "ELSE", "END", "ESCAPE", "EXCEPT", "EXCLUDE", "EXISTS", "FAIL",
    "FALSE", "FILTER", "FIRST", "FOLLOWING", "FROM", "FULL", "GLOB", "GROUP", "GROUPS", "HAVING",
    "IGNORE", "IN", "INDEXED", "INNER", "INSERT", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN",
    "LAST", "LEFT", "LIKE", "LIMIT", "MATCH", "MATERIALIZED", "NATURAL", "NO", "NOT", "NOTHING",
    "NOTNULL", "NULL", "NULLS", "OFFSET", "ON", "OR", "ORDER", "OTHERS", "OUTER", "OVER",
    "PARTITION", "PRECEDING", "RAISE", "RANGE", "RECURSIVE", "REGEXP", "REPLACE", "RETURNING",
    "RIGHT", "ROLLBACK", "ROW", "ROWS", "SELECT", "SET", "THEN", "TIES", "TRUE", "UNBOUNDED",
    "UNION", "UPDATE", "USING", "VALUES", "WHEN", "WHERE", "WINDOW", "WITH",
];

/// Reserved words that nevertheless complete an operand.
const OPERAND_KEYWORDS: &[&str] = &[
    "NULL",
    "TRUE",
    "FALSE",
    "END",
    "CURRENT_DATE",
    "CURRENT_TIME",
    "CURRENT_TIMESTAMP",
    "ISNULL",
    "NOTNULL",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|k| word.eq_ignore_ascii_case(k))
}

/// Re-spells a word with its quotes, doubling any embedded closing quote.
fn word_text(word: &Word) -> String {
    match word.quote_style {
        Some(open) => {
            let close = if open == '[' { ']' } else { open };
            let doubled: String = [close, close].iter().collect();
            let body = word.value.replace(close, &doubled);
            format!("{}{}{}", open, body, close)
        }
        None => word.value.clone(),
    }
}

/// Re-spells a string literal body inside `quote`, doubling embedded quotes.
fn quoted_literal(prefix: &str, quote: char, body: &str) -> String {
    let doubled: String = [quote, quote].iter().collect();
    format!("{}{}{}{}", prefix, quote, body.replace(quote, &doubled), quote)
}

fn named(name: &str) -> Result<Placeholder, String> {
    if name.is_empty() {
        return Err("placeholder prefix without a name".to_string());
    }
    Ok(Placeholder::Named(name.to_string()))
}

fn parse_placeholder(raw: &str) -> Result<Placeholder, String> {
    if let Some(digits) = raw.strip_prefix('?') {
        if digits.is_empty() {
            return Ok(Placeholder::Positional);
        }
        let index: usize = digits
            .parse()
            .map_err(|_| format!("malformed placeholder '{}'", raw))?;
        if index == 0 || index > MAX_PLACEHOLDER_INDEX {
            return Err(format!("placeholder '{}' is out of range", raw));
        }
        return Ok(Placeholder::Numbered(index));
    }
    match raw.chars().next() {
        Some(':') | Some('@') | Some('$') => named(&raw[1..]),
        _ => Err(format!("unrecognized placeholder '{}'", raw)),
    }
}

/// Tokenizes `sql` with the SQLite dialect.
pub fn tokenize(sql: &str) -> Result<Vec<Tok>, String> {
    let dialect = SQLiteDialect {};
    let raw = Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|e| e.to_string())?;

    let mut out: Vec<Tok> = Vec::with_capacity(raw.len());
    let mut space = false;
    let mut iter = raw.into_iter().peekable();
    while let Some(token) = iter.next() {
        let space_before = std::mem::take(&mut space);
        let push = |out: &mut Vec<Tok>, kind: TokKind, text: String| {
            out.push(Tok {
                kind,
                text,
                space_before,
            })
        };
        match token {
            Token::Whitespace(_) => space = true,
            Token::EOF => {}
            Token::Placeholder(raw) => {
                let ph = parse_placeholder(&raw)?;
                push(&mut out, TokKind::Placeholder(ph), raw);
            }
            // `:name` / `@name` may arrive as a prefix token followed by a word.
            Token::Colon | Token::AtSign => {
                let prefix = token.to_string();
                match iter.peek() {
                    Some(Token::Word(w)) if w.quote_style.is_none() => {
                        let name = w.value.clone();
                        iter.next();
                        let ph = named(&name)?;
                        push(&mut out, TokKind::Placeholder(ph), format!("{}{}", prefix, name));
                    }
                    _ => push(&mut out, TokKind::Other, prefix),
                }
            }
            Token::Word(w) => {
                let text = word_text(&w);
                let prefixed = w.quote_style.is_none()
                    && matches!(w.value.chars().next(), Some('$') | Some('@') | Some(':'));
                if prefixed {
                    let ph = named(&w.value[1..])?;
                    push(&mut out, TokKind::Placeholder(ph), text);
                } else {
                    let keyword = w.quote_style.is_none() && is_reserved(&w.value);
                    push(
                        &mut out,
                        TokKind::Word {
                            value: w.value,
                            quoted: w.quote_style.is_some(),
                            keyword,
                        },
                        text,
                    );
                }
            }
            Token::Comma => push(&mut out, TokKind::Comma, ",".into()),
            Token::Period => push(&mut out, TokKind::Period, ".".into()),
            Token::LParen => push(&mut out, TokKind::LParen, "(".into()),
            Token::RParen => push(&mut out, TokKind::RParen, ")".into()),
            Token::Mul => push(&mut out, TokKind::Star, "*".into()),
            Token::SemiColon => push(&mut out, TokKind::Semicolon, ";".into()),
            Token::Number(..) => {
                let text = token.to_string();
                push(&mut out, TokKind::Literal, text);
            }
            Token::SingleQuotedString(body) => {
                push(&mut out, TokKind::Literal, quoted_literal("", '\'', &body));
            }
            Token::DoubleQuotedString(body) => {
                push(&mut out, TokKind::Literal, quoted_literal("", '"', &body));
            }
            Token::HexStringLiteral(body) => {
                push(&mut out, TokKind::Literal, quoted_literal("X", '\'', &body));
            }
            other => {
                let text = other.to_string();
                push(&mut out, TokKind::Other, text);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholders(sql: &str) -> Vec<Placeholder> {
        tokenize(sql)
            .unwrap()
            .into_iter()
            .filter_map(|t| match t.kind {
                TokKind::Placeholder(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn recognizes_all_placeholder_forms() {
        assert_eq!(
            placeholders("SELECT * FROM t WHERE a = ? AND b = ?"),
            vec![Placeholder::Positional, Placeholder::Positional]
        );
        assert_eq!(
            placeholders("SELECT * FROM t WHERE a = ?2 AND b = ?1"),
            vec![Placeholder::Numbered(2), Placeholder::Numbered(1)]
        );
        assert_eq!(
            placeholders("SELECT * FROM t WHERE a = :min AND b = @max AND c = $mid"),
            vec![
                Placeholder::Named("min".into()),
                Placeholder::Named("max".into()),
                Placeholder::Named("mid".into())
            ]
        );
    }

    #[test]
    fn placeholders_inside_strings_are_literals() {
        assert!(placeholders("SELECT '?' FROM t WHERE x = ':nope'").is_empty());
    }

    #[test]
    fn zero_index_is_rejected() {
        assert!(tokenize("SELECT * FROM t WHERE a = ?0").is_err());
    }

    #[test]
    fn comments_collapse_to_whitespace() {
        let toks = tokenize("SELECT a -- trailing ?\nFROM t").unwrap();
        assert!(toks.iter().all(|t| !matches!(t.kind, TokKind::Placeholder(_))));
        assert!(toks.iter().any(|t| t.is_kw("FROM") && t.space_before));
    }

    #[test]
    fn quoted_identifiers_are_words() {
        let toks = tokenize("SELECT \"select\" FROM t").unwrap();
        assert_eq!(
            toks[1].kind,
            TokKind::Word {
                value: "select".into(),
                quoted: true,
                keyword: false
            }
        );
        assert!(!toks[1].is_kw("SELECT"));
    }

    #[test]
    fn embedded_quotes_are_respelled_doubled() {
        let toks = tokenize("SELECT \"a\"\"b\", [c d] FROM t WHERE x = 'it''s'").unwrap();
        let texts: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert!(texts.contains(&"\"a\"\"b\""));
        assert!(texts.contains(&"[c d]"));
        assert!(texts.contains(&"'it''s'"));
        assert_eq!(toks[1].word(), Some("a\"b"));
    }

    #[test]
    fn generic_keywords_are_plain_words() {
        let toks = tokenize("SELECT status, value, position, owner FROM t WHERE x IS NULL").unwrap();
        let flagged: Vec<&str> = toks
            .iter()
            .filter(|t| matches!(t.kind, TokKind::Word { keyword: true, .. }))
            .map(|t| t.text.as_str())
            .collect();
        assert_eq!(flagged, vec!["SELECT", "FROM", "WHERE", "IS", "NULL"]);
    }
}
