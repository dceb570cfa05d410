//! Recursive-descent parser producing a concrete syntax tree
//!
//! Punctuation and keywords are kept as leaf nodes so every byte of a
//! statement is covered by some node. A malformed statement becomes an
//! `Error` node and parsing resumes after the next `;` or at the next `}`.

use crate::error::{CompileError, Result};
use crate::lexer::Token;
use crate::syntax::{NodeId, NodeKind, Span, SyntaxTree};


/// Parsed tree plus the syntax errors found while building it
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub tree: SyntaxTree,
    pub errors: Vec<CompileError>,
}

impl ParseOutput {
    /// The tree, or the first syntax error
    pub fn into_result(self) -> Result<SyntaxTree> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(self.tree),
        }
    }
}

/// Parse a token stream, comments included
pub fn parse(source: &str, tokens: Vec<(Token, Span)>) -> ParseOutput {
    let (comments, tokens): (Vec<_>, Vec<_>) = tokens
        .into_iter()
        .partition(|(token, _)| *token == Token::LineComment);
    let mut parser = Parser {
        source_len: source.len(),
        tokens,
        comments: comments.into_iter().map(|(_, span)| span).collect(),
        next_comment: 0,
        pos: 0,
        last_end: 0,
        tree: SyntaxTree::new(),
        errors: Vec::new(),
    };
    parser.program();
    ParseOutput {
        tree: parser.tree,
        errors: parser.errors,
    }
}

/// Unwinds the current statement
struct Abort {
    message: String,
    span: Span,
}

type PResult<T = NodeId> = std::result::Result<T, Abort>;

/// Remaining stack below which deeply nested input grows a new segment
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

const COMPARISON: &[Token] = &[
    Token::EqEq,
    Token::NotEq,
    Token::Lt,
    Token::LtEq,
    Token::Gt,
    Token::GtEq,
];

struct Parser {
    source_len: usize,
    tokens: Vec<(Token, Span)>,
    comments: Vec<Span>,
    next_comment: usize,
    pos: usize,
    last_end: usize,
    tree: SyntaxTree,
    errors: Vec<CompileError>,
}

impl Parser {
    // ---- token access ----

    fn peek(&self) -> Option<Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| *t)
    }

    fn at(&self, token: Token) -> bool {
        self.peek() == Some(token)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map_or(Span::new(self.source_len, self.source_len), |(_, s)| *s)
    }

    fn bump(&mut self) -> Span {
        let span = self.current_span();
        if self.pos < self.tokens.len() {
            self.pos += 1;
            self.last_end = span.end;
        }
        span
    }

    fn leaf(&mut self, kind: NodeKind) -> NodeId {
        let span = self.bump();
        self.tree.alloc(kind, span, Vec::new())
    }

    fn node(&mut self, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        let span = match (children.first(), children.last()) {
            (Some(&first), Some(&last)) => self.tree.span(first).merge(self.tree.span(last)),
            _ => Span::new(self.last_end, self.last_end),
        };
        self.tree.alloc(kind, span, children)
    }

    fn unexpected(&self, expected: &str) -> Abort {
        let found = self.peek().map_or("end of input", Token::describe);
        Abort {
            message: format!("expected {expected}, found {found}"),
            span: self.current_span(),
        }
    }

    fn expect(&mut self, token: Token, kind: NodeKind) -> PResult {
        if self.at(token) {
            Ok(self.leaf(kind))
        } else {
            Err(self.unexpected(token.describe()))
        }
    }

    fn punct(&mut self, token: Token) -> PResult {
        self.expect(token, NodeKind::Punct)
    }

    fn keyword(&mut self, token: Token) -> PResult {
        self.expect(token, NodeKind::Keyword)
    }

    /// Comment nodes that start before `offset`
    fn flush_comments(&mut self, before: usize, children: &mut Vec<NodeId>) {
        while let Some(&span) = self.comments.get(self.next_comment)
            && span.start < before
        {
            self.next_comment += 1;
            children.push(self.tree.alloc(NodeKind::LineComment, span, Vec::new()));
        }
    }

    // ---- statements ----

    fn program(&mut self) {
        let mut children = Vec::new();
        loop {
            let next = self.current_span().start;
            self.flush_comments(next, &mut children);
            if self.peek().is_none() {
                break;
            }
            children.push(self.statement_or_error(true));
        }
        self.flush_comments(usize::MAX, &mut children);
        let root = self
            .tree
            .alloc(NodeKind::Program, Span::new(0, self.source_len), children);
        self.tree.set_root(root);
    }

    fn statement_or_error(&mut self, top_level: bool) -> NodeId {
        let start = self.current_span().start;
        match self.statement() {
            Ok(id) => id,
            Err(abort) => {
                self.errors
                    .push(CompileError::syntax(&abort.message, abort.span));
                self.recover(top_level);
                let end = self.last_end.max(abort.span.end).max(start);
                self.tree
                    .alloc(NodeKind::Error, Span::new(start, end), Vec::new())
            }
        }
    }

    /// Skip to just past the next `;`, or up to a closing `}`.
    /// At the top level there is no block to close, so the `}` is consumed.
    fn recover(&mut self, top_level: bool) {
        while let Some(token) = self.peek() {
            match token {
                Token::Semi => {
                    self.bump();
                    return;
                }
                Token::RBrace => {
                    if top_level {
                        self.bump();
                    }
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn statement(&mut self) -> PResult {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.statement_inner())
    }

    fn statement_inner(&mut self) -> PResult {
        match self.peek() {
            Some(Token::Init) => self.init_stmt(),
            Some(Token::Ref) => self.ref_stmt(),
            Some(Token::Change) => self.change_stmt(),
            Some(Token::If) => self.if_stmt(),
            Some(Token::While) => self.while_stmt(),
            Some(Token::For) => self.for_stmt(),
            Some(Token::Return) => self.return_stmt(),
            Some(Token::Func) if self.peek_at(1) == Some(Token::Ident) => self.func_decl(),
            Some(Token::Debugger) => {
                let kw = self.keyword(Token::Debugger)?;
                let semi = self.punct(Token::Semi)?;
                Ok(self.node(NodeKind::DebuggerStmt, vec![kw, semi]))
            }
            Some(Token::LBrace) => self.block(),
            _ => {
                let expr = self.expression()?;
                let semi = self.punct(Token::Semi)?;
                Ok(self.node(NodeKind::ExprStmt, vec![expr, semi]))
            }
        }
    }

    fn block(&mut self) -> PResult {
        let mut children = vec![self.punct(Token::LBrace)?];
        loop {
            let next = self.current_span().start;
            self.flush_comments(next, &mut children);
            match self.peek() {
                Some(Token::RBrace) => break,
                None => return Err(self.unexpected("`}`")),
                Some(_) => children.push(self.statement_or_error(false)),
            }
        }
        children.push(self.punct(Token::RBrace)?);
        Ok(self.node(NodeKind::Block, children))
    }

    fn init_stmt(&mut self) -> PResult {
        let mut children = vec![self.keyword(Token::Init)?];
        if self.at(Token::Catch) {
            children.push(self.leaf(NodeKind::CatchKw));
        }
        children.push(self.expect(Token::Ident, NodeKind::Identifier)?);
        children.push(self.punct(Token::Eq)?);
        children.push(self.expression()?);
        children.push(self.punct(Token::Semi)?);
        Ok(self.node(NodeKind::InitStmt, children))
    }

    fn ref_stmt(&mut self) -> PResult {
        let children = vec![
            self.keyword(Token::Ref)?,
            self.expect(Token::Ident, NodeKind::Identifier)?,
            self.punct(Token::Eq)?,
            self.expression()?,
            self.punct(Token::Semi)?,
        ];
        Ok(self.node(NodeKind::RefStmt, children))
    }

    fn change_stmt(&mut self) -> PResult {
        let kw = self.keyword(Token::Change)?;
        let target = self.postfix()?;
        let target_kind = self.tree.kind(target);
        if !matches!(
            target_kind,
            NodeKind::Identifier | NodeKind::MemberExpr | NodeKind::IndexExpr
        ) {
            return Err(Abort {
                message: "invalid assignment target".to_string(),
                span: self.tree.span(target),
            });
        }
        let children = vec![
            kw,
            target,
            self.punct(Token::Eq)?,
            self.expression()?,
            self.punct(Token::Semi)?,
        ];
        Ok(self.node(NodeKind::ChangeStmt, children))
    }

    /// `( expr ) then`, pushed onto `children`
    fn condition_header(&mut self, children: &mut Vec<NodeId>) -> PResult<()> {
        children.push(self.punct(Token::LParen)?);
        children.push(self.expression()?);
        children.push(self.punct(Token::RParen)?);
        children.push(self.keyword(Token::Then)?);
        Ok(())
    }

    fn if_stmt(&mut self) -> PResult {
        let mut children = vec![self.keyword(Token::If)?];
        self.condition_header(&mut children)?;
        children.push(self.block()?);
        if self.at(Token::Else) {
            children.push(self.keyword(Token::Else)?);
            let alternative = if self.at(Token::If) {
                self.if_stmt()?
            } else {
                self.block()?
            };
            children.push(alternative);
        }
        Ok(self.node(NodeKind::IfStmt, children))
    }

    fn while_stmt(&mut self) -> PResult {
        let mut children = vec![self.keyword(Token::While)?];
        self.condition_header(&mut children)?;
        children.push(self.block()?);
        Ok(self.node(NodeKind::WhileStmt, children))
    }

    fn for_stmt(&mut self) -> PResult {
        let children = vec![
            self.keyword(Token::For)?,
            self.punct(Token::LParen)?,
            self.expect(Token::Ident, NodeKind::Identifier)?,
            self.keyword(Token::In)?,
            self.expression()?,
            self.punct(Token::RParen)?,
            self.keyword(Token::Then)?,
            self.block()?,
        ];
        Ok(self.node(NodeKind::ForStmt, children))
    }

    fn return_stmt(&mut self) -> PResult {
        let mut children = vec![self.keyword(Token::Return)?];
        if !self.at(Token::Semi) {
            children.push(self.expression()?);
        }
        children.push(self.punct(Token::Semi)?);
        Ok(self.node(NodeKind::ReturnStmt, children))
    }

    fn func_decl(&mut self) -> PResult {
        let children = vec![
            self.keyword(Token::Func)?,
            self.expect(Token::Ident, NodeKind::Identifier)?,
            self.param_list()?,
            self.block()?,
        ];
        Ok(self.node(NodeKind::FuncDecl, children))
    }

    fn param_list(&mut self) -> PResult {
        let mut children = vec![self.punct(Token::LParen)?];
        self.delimited(&mut children, Token::RParen, |p| {
            p.expect(Token::Ident, NodeKind::Identifier)
        })?;
        Ok(self.node(NodeKind::ParamList, children))
    }

    /// Comma-separated items up to and including `close`; trailing comma allowed
    fn delimited(
        &mut self,
        children: &mut Vec<NodeId>,
        close: Token,
        mut item: impl FnMut(&mut Self) -> PResult,
    ) -> PResult<()> {
        while !self.at(close) {
            children.push(item(self)?);
            if self.at(Token::Comma) {
                children.push(self.leaf(NodeKind::Punct));
            } else {
                break;
            }
        }
        children.push(self.punct(close)?);
        Ok(())
    }

    // ---- expressions ----

    fn expression(&mut self) -> PResult {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.or_expr())
    }

    fn binary_level(&mut self, ops: &[Token], next: fn(&mut Self) -> PResult) -> PResult {
        let mut lhs = next(self)?;
        while let Some(token) = self.peek()
            && ops.contains(&token)
        {
            let op = self.leaf(NodeKind::Operator);
            let rhs = next(self)?;
            lhs = self.node(NodeKind::BinaryExpr, vec![lhs, op, rhs]);
        }
        Ok(lhs)
    }

    fn or_expr(&mut self) -> PResult {
        self.binary_level(&[Token::Or], Self::and_expr)
    }

    fn and_expr(&mut self) -> PResult {
        self.binary_level(&[Token::And], Self::comparison)
    }

    fn comparison(&mut self) -> PResult {
        self.binary_level(COMPARISON, Self::bit_or)
    }

    fn bit_or(&mut self) -> PResult {
        self.binary_level(&[Token::Pipe], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> PResult {
        self.binary_level(&[Token::Caret], Self::bit_and)
    }

    fn bit_and(&mut self) -> PResult {
        self.binary_level(&[Token::Amp], Self::shift)
    }

    fn shift(&mut self) -> PResult {
        self.binary_level(&[Token::Shl, Token::Shr], Self::additive)
    }

    fn additive(&mut self) -> PResult {
        self.binary_level(&[Token::Plus, Token::Minus], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> PResult {
        self.binary_level(&[Token::Star, Token::Slash, Token::Percent], Self::unary)
    }

    fn unary(&mut self) -> PResult {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.unary_inner())
    }

    fn unary_inner(&mut self) -> PResult {
        if matches!(self.peek(), Some(Token::Minus | Token::Not | Token::Tilde)) {
            let op = self.leaf(NodeKind::Operator);
            let operand = self.unary()?;
            return Ok(self.node(NodeKind::UnaryExpr, vec![op, operand]));
        }
        self.power()
    }

    fn power(&mut self) -> PResult {
        let base = self.postfix()?;
        if !self.at(Token::StarStar) {
            return Ok(base);
        }
        let op = self.leaf(NodeKind::Operator);
        // Right-associative, and binds tighter than a unary minus on its left
        let exponent = self.unary()?;
        Ok(self.node(NodeKind::BinaryExpr, vec![base, op, exponent]))
    }

    fn postfix(&mut self) -> PResult {
        let mut expr = self.primary()?;
        loop {
            expr = match self.peek() {
                Some(Token::LParen) => {
                    let mut args = vec![self.punct(Token::LParen)?];
                    self.delimited(&mut args, Token::RParen, Self::expression)?;
                    let args = self.node(NodeKind::ArgList, args);
                    self.node(NodeKind::CallExpr, vec![expr, args])
                }
                Some(Token::Dot) => {
                    let dot = self.punct(Token::Dot)?;
                    let name = self.expect(Token::Ident, NodeKind::PropertyName)?;
                    self.node(NodeKind::MemberExpr, vec![expr, dot, name])
                }
                Some(Token::LBracket) => {
                    let open = self.punct(Token::LBracket)?;
                    let index = self.expression()?;
                    let close = self.punct(Token::RBracket)?;
                    self.node(NodeKind::IndexExpr, vec![expr, open, index, close])
                }
                _ => return Ok(expr),
            };
        }
    }

    fn primary(&mut self) -> PResult {
        let Some(token) = self.peek() else {
            return Err(self.unexpected("expression"));
        };
        match token {
            Token::IntLit | Token::FloatLit => Ok(self.leaf(NodeKind::Number)),
            Token::StringLit => Ok(self.leaf(NodeKind::String)),
            Token::True | Token::False => Ok(self.leaf(NodeKind::Boolean)),
            Token::Nil => Ok(self.leaf(NodeKind::Nil)),
            Token::Ident => Ok(self.leaf(NodeKind::Identifier)),
            Token::LParen => {
                let children = vec![
                    self.punct(Token::LParen)?,
                    self.expression()?,
                    self.punct(Token::RParen)?,
                ];
                Ok(self.node(NodeKind::ParenExpr, children))
            }
            Token::LBracket => {
                let mut children = vec![self.punct(Token::LBracket)?];
                self.delimited(&mut children, Token::RBracket, Self::expression)?;
                Ok(self.node(NodeKind::TupleLiteral, children))
            }
            Token::New => match self.peek_at(1) {
                Some(Token::LBracket) => {
                    let mut children = vec![self.keyword(Token::New)?, self.punct(Token::LBracket)?];
                    self.delimited(&mut children, Token::RBracket, Self::expression)?;
                    Ok(self.node(NodeKind::ListLiteral, children))
                }
                Some(Token::LBrace) => {
                    let mut children = vec![self.keyword(Token::New)?, self.punct(Token::LBrace)?];
                    self.delimited(&mut children, Token::RBrace, Self::map_entry)?;
                    Ok(self.node(NodeKind::MapLiteral, children))
                }
                _ => {
                    self.bump();
                    Err(self.unexpected("`[` or `{` after `new`"))
                }
            },
            Token::Func => {
                let children = vec![
                    self.keyword(Token::Func)?,
                    self.param_list()?,
                    self.block()?,
                ];
                Ok(self.node(NodeKind::FuncLiteral, children))
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn map_entry(&mut self) -> PResult {
        let key = match self.peek() {
            Some(Token::Ident) => self.leaf(NodeKind::PropertyName),
            Some(Token::StringLit) => self.leaf(NodeKind::String),
            _ => return Err(self.unexpected("map key")),
        };
        let children = vec![key, self.punct(Token::Colon)?, self.expression()?];
        Ok(self.node(NodeKind::MapEntry, children))
    }
}
