//! Lexer implementation using logos

mod token;

pub use token::Token;

use crate::error::{CompileError, Result};
use crate::syntax::Span;
use logos::Logos;

/// Tokenize source code, stopping at the first unexpected character
pub fn tokenize(source: &str) -> Result<Vec<(Token, Span)>> {
    let mut tokens = Vec::new();
    for (token, span) in tokenize_lossy(source) {
        match token {
            Some(token) => tokens.push((token, span)),
            None => {
                return Err(CompileError::lexer(
                    format!("unexpected character: {:?}", span.slice(source)),
                    span,
                ));
            }
        }
    }
    Ok(tokens)
}

/// Tokenize source code, yielding `None` for unlexable slices
pub fn tokenize_lossy(source: &str) -> Vec<(Option<Token>, Span)> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        let span = Span::new(lexer.span().start, lexer.span().end);
        tokens.push((result.ok(), span));
    }
    tokens
}

/// Decode a quoted string literal, including its surrounding quotes
pub fn unescape(literal: &str) -> Option<String> {
    let inner = literal.strip_prefix('"')?.strip_suffix('"')?;
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('0') => result.push('\0'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => return None,
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_keywords() {
        assert_eq!(
            kinds("init change ref catch func return"),
            vec![Token::Init, Token::Change, Token::Ref, Token::Catch, Token::Func, Token::Return]
        );
    }

    #[test]
    fn test_tokenize_keyword_prefix_is_identifier() {
        assert_eq!(kinds("initial inx"), vec![Token::Ident, Token::Ident]);
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(kinds("42 1.5 2e3"), vec![Token::IntLit, Token::FloatLit, Token::FloatLit]);
    }

    #[test]
    fn test_tokenize_operators() {
        assert_eq!(
            kinds("+ - * / % ** << >> & | ^ ~"),
            vec![
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Slash,
                Token::Percent,
                Token::StarStar,
                Token::Shl,
                Token::Shr,
                Token::Amp,
                Token::Pipe,
                Token::Caret,
                Token::Tilde,
            ]
        );
    }

    #[test]
    fn test_tokenize_comparison_operators() {
        assert_eq!(
            kinds("== != < > <= >= ="),
            vec![Token::EqEq, Token::NotEq, Token::Lt, Token::Gt, Token::LtEq, Token::GtEq, Token::Eq]
        );
    }

    #[test]
    fn test_tokenize_comment_is_token() {
        let tokens = tokenize("init // note\nx").unwrap();
        assert_eq!(tokens[1].0, Token::LineComment);
        assert_eq!(tokens[1].1, Span::new(5, 12));
    }

    #[test]
    fn test_tokenize_spans() {
        let tokens = tokenize("init abc").unwrap();
        assert_eq!(tokens[0].1, Span::new(0, 4));
        assert_eq!(tokens[1].1, Span::new(5, 8));
    }

    #[test]
    fn test_tokenize_unexpected_character_error() {
        let err = tokenize("init $x").unwrap_err();
        assert_eq!(err.span(), Some(Span::new(5, 6)));
        assert!(err.message().contains("unexpected character"));
    }

    #[test]
    fn test_tokenize_lossy_keeps_going() {
        let tokens = tokenize_lossy("a $ b");
        assert_eq!(tokens.len(), 3);
        assert!(tokens[1].0.is_none());
        assert_eq!(tokens[2].0, Some(Token::Ident));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#""a\nb""#).as_deref(), Some("a\nb"));
        assert_eq!(unescape(r#""say \"hi\"""#).as_deref(), Some("say \"hi\""));
        assert_eq!(unescape("\"héllo\"").as_deref(), Some("héllo"));
        assert_eq!(unescape("nope"), None);
    }
}
