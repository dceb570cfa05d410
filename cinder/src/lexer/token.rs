//! Token definitions

use logos::Logos;

/// Cinder token
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\n\r\f]+")]
pub enum Token {
    // Keywords
    #[token("init")]
    Init,
    #[token("change")]
    Change,
    #[token("ref")]
    Ref,
    #[token("catch")]
    Catch,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("return")]
    Return,
    #[token("func")]
    Func,
    #[token("debugger")]
    Debugger,
    #[token("new")]
    New,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("nil")]
    Nil,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,

    // Literals
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?|[0-9]+[eE][+-]?[0-9]+", priority = 3)]
    FloatLit,
    #[regex(r"[0-9]+", priority = 2)]
    IntLit,
    #[regex(r#""([^"\\]|\\.)*""#)]
    StringLit,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    #[regex(r"//[^\n]*")]
    LineComment,

    // Operators
    #[token("**")]
    StarStar,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("=")]
    Eq,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    // Punctuation
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
}

impl Token {
    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            Token::Init
                | Token::Change
                | Token::Ref
                | Token::Catch
                | Token::If
                | Token::Then
                | Token::Else
                | Token::While
                | Token::For
                | Token::In
                | Token::Return
                | Token::Func
                | Token::Debugger
                | Token::New
                | Token::True
                | Token::False
                | Token::Nil
                | Token::And
                | Token::Or
                | Token::Not
        )
    }

    /// Human-readable name for error messages
    pub fn describe(self) -> &'static str {
        match self {
            Token::Init => "`init`",
            Token::Change => "`change`",
            Token::Ref => "`ref`",
            Token::Catch => "`catch`",
            Token::If => "`if`",
            Token::Then => "`then`",
            Token::Else => "`else`",
            Token::While => "`while`",
            Token::For => "`for`",
            Token::In => "`in`",
            Token::Return => "`return`",
            Token::Func => "`func`",
            Token::Debugger => "`debugger`",
            Token::New => "`new`",
            Token::True => "`true`",
            Token::False => "`false`",
            Token::Nil => "`nil`",
            Token::And => "`and`",
            Token::Or => "`or`",
            Token::Not => "`not`",
            Token::FloatLit | Token::IntLit => "number",
            Token::StringLit => "string",
            Token::Ident => "identifier",
            Token::LineComment => "comment",
            Token::StarStar => "`**`",
            Token::Plus => "`+`",
            Token::Minus => "`-`",
            Token::Star => "`*`",
            Token::Slash => "`/`",
            Token::Percent => "`%`",
            Token::Amp => "`&`",
            Token::Pipe => "`|`",
            Token::Caret => "`^`",
            Token::Tilde => "`~`",
            Token::Shl => "`<<`",
            Token::Shr => "`>>`",
            Token::EqEq => "`==`",
            Token::NotEq => "`!=`",
            Token::Lt => "`<`",
            Token::LtEq => "`<=`",
            Token::Gt => "`>`",
            Token::GtEq => "`>=`",
            Token::Eq => "`=`",
            Token::LParen => "`(`",
            Token::RParen => "`)`",
            Token::LBrace => "`{`",
            Token::RBrace => "`}`",
            Token::LBracket => "`[`",
            Token::RBracket => "`]`",
            Token::Comma => "`,`",
            Token::Semi => "`;`",
            Token::Colon => "`:`",
            Token::Dot => "`.`",
        }
    }
}
