//! Syntax tree to bytecode lowering
//!
//! The compiler walks any [`SyntaxCursor`], resolves names against a stack of
//! compile-time scopes and emits a flat instruction vector. Name errors are
//! collected as diagnostics; structural problems abort with a `CompileError`.

mod scope;

#[cfg(test)]
mod tests;

pub use scope::NameScopes;

use crate::bytecode::{Immediate, Instruction, Op};
use crate::error::{CompileError, Diagnostic, LineIndex, Result};
use crate::lexer::unescape;
use crate::syntax::{children_of, NodeKind, Span, SyntaxCursor};
use crate::util::{find_similar_name, format_suggestion_hint, suggestion_threshold};
use crate::value::{BinOp, Number, UnOp};
use std::collections::HashSet;
use tracing::debug;

/// Stack growth threshold for deeply nested expressions
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Name of the reserved type-query call form
const TYPEOF: &str = "typeof";

/// Instructions plus the non-fatal diagnostics found while producing them
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub instructions: Vec<Instruction>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileOutput {
    /// A host must not run code that produced diagnostics
    pub fn is_runnable(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Compile a whole program
pub fn compile<C: SyntaxCursor>(
    source: &str,
    root: C,
    foreign_names: &[String],
) -> Result<CompileOutput> {
    let compiler = Compiler::new(source, foreign_names, NameScopes::new(), false);
    compiler.run(root)
}

/// Compile one REPL submission.
///
/// `known_names` are the globals left by earlier submissions. They resolve
/// without being re-flagged when a submission declares them again, and the
/// value of a trailing bare expression is left on the stack.
pub fn compile_repl<C: SyntaxCursor>(
    source: &str,
    root: C,
    foreign_names: &[String],
    known_names: &[String],
) -> Result<CompileOutput> {
    let mut names = NameScopes::with_known(known_names.iter().map(String::as_str));
    names.enter();
    let compiler = Compiler::new(source, foreign_names, names, true);
    compiler.run(root)
}

struct Compiler<'s> {
    source: &'s str,
    lines: LineIndex,
    code: Vec<Instruction>,
    diagnostics: Vec<Diagnostic>,
    names: NameScopes,
    foreign: HashSet<String>,
    /// Span stamped on emitted instructions
    span: Span,
    repl: bool,
}

impl<'s> Compiler<'s> {
    fn new(source: &'s str, foreign_names: &[String], names: NameScopes, repl: bool) -> Self {
        Compiler {
            source,
            lines: LineIndex::new(source),
            code: Vec::new(),
            diagnostics: Vec::new(),
            names,
            foreign: foreign_names.iter().cloned().collect(),
            span: Span::default(),
            repl,
        }
    }

    fn run<C: SyntaxCursor>(mut self, root: C) -> Result<CompileOutput> {
        if root.kind() != NodeKind::Program {
            return Err(CompileError::syntax(
                format!("expected a program node, found {:?}", root.kind()),
                root.span(),
            ));
        }
        self.statements(&root, true)?;
        debug!(
            instructions = self.code.len(),
            diagnostics = self.diagnostics.len(),
            repl = self.repl,
            "compiled program"
        );
        Ok(CompileOutput {
            instructions: self.code,
            diagnostics: self.diagnostics,
        })
    }

    // ---- emission ----

    fn emit(&mut self, op: Op) -> usize {
        self.emit_at(op, self.span)
    }

    fn emit_at(&mut self, op: Op, span: Span) -> usize {
        self.code.push(Instruction::new(op, span));
        self.code.len() - 1
    }

    /// Point the placeholder jump at `index` to the next instruction
    fn patch_jump(&mut self, index: usize) -> Result<()> {
        let here = self.code.len();
        let span = self.code[index].span;
        match self.code[index].op.target_mut() {
            Some(target) => {
                *target = here;
                Ok(())
            }
            None => Err(CompileError::syntax("patched instruction is not a jump", span)),
        }
    }

    fn diagnostic(&mut self, message: String, span: Span) {
        self.diagnostics.push(Diagnostic {
            message,
            range: self.lines.range(span),
        });
    }

    // ---- tree access ----

    fn text<C: SyntaxCursor>(&self, node: &C) -> &'s str {
        node.span().slice(self.source)
    }

    /// Children that carry meaning; fails on parser error nodes
    fn parts<C: SyntaxCursor>(&self, node: &C) -> Result<Vec<C>> {
        let mut parts = Vec::new();
        for child in children_of(node) {
            match child.kind() {
                NodeKind::Error => return Err(self.error_node(&child)),
                kind if kind.is_trivia() => {}
                _ => parts.push(child),
            }
        }
        Ok(parts)
    }

    /// `parts` with at least `min` entries
    fn parts_min<C: SyntaxCursor>(&self, node: &C, min: usize) -> Result<Vec<C>> {
        let parts = self.parts(node)?;
        if parts.len() < min {
            return Err(CompileError::syntax(
                format!("malformed {:?}: missing child node", node.kind()),
                node.span(),
            ));
        }
        Ok(parts)
    }

    fn error_node<C: SyntaxCursor>(&self, node: &C) -> CompileError {
        let text = self.text(node);
        let message = if text.is_empty() {
            "syntax error".to_string()
        } else {
            format!("syntax error near {text:?}")
        };
        CompileError::syntax(message, node.span())
    }

    fn ident<C: SyntaxCursor>(&self, node: &C) -> Result<String> {
        if node.kind() != NodeKind::Identifier {
            return Err(CompileError::syntax(
                format!("expected identifier, found {:?}", node.kind()),
                node.span(),
            ));
        }
        Ok(self.text(node).to_string())
    }

    // ---- names ----

    fn declare(&mut self, name: &str, span: Span) {
        if !self.names.declare(name) {
            self.diagnostic(format!("'{name}' is already declared in this scope"), span);
        }
    }

    fn check_defined(&mut self, name: &str, span: Span) {
        if self.names.resolves(name) {
            return;
        }
        let visible: Vec<&str> = self
            .names
            .visible()
            .chain(self.foreign.iter().map(String::as_str))
            .collect();
        let suggestion = find_similar_name(name, visible, suggestion_threshold(name));
        let hint = format_suggestion_hint(suggestion);
        self.diagnostic(format!("'{name}' is not defined{hint}"), span);
    }

    // ---- statements ----

    /// Two-phase lowering of a block's statements in the current name scope
    fn statements<C: SyntaxCursor>(&mut self, parent: &C, top_level: bool) -> Result<()> {
        let children = self.parts(parent)?;

        for child in children.iter().filter(|c| c.kind() == NodeKind::FuncDecl) {
            let parts = self.parts(child)?;
            if let Some(name) = parts.first() {
                let name_text = self.ident(name)?;
                self.declare(&name_text, name.span());
            }
        }

        let last = children.len().checked_sub(1);
        for (i, child) in children.iter().enumerate() {
            if !child.kind().is_statement() {
                return Err(CompileError::syntax(
                    format!("expected a statement, found {:?}", child.kind()),
                    child.span(),
                ));
            }
            let keep_value = self.repl && top_level && Some(i) == last;
            self.statement(child, keep_value)?;
        }
        Ok(())
    }

    fn statement<C: SyntaxCursor>(&mut self, node: &C, keep_value: bool) -> Result<()> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.statement_inner(node, keep_value)
        })
    }

    fn statement_inner<C: SyntaxCursor>(&mut self, node: &C, keep_value: bool) -> Result<()> {
        let saved = self.span;
        self.span = node.span();
        let result = match node.kind() {
            NodeKind::InitStmt => self.init_stmt(node),
            NodeKind::RefStmt => self.ref_stmt(node),
            NodeKind::ChangeStmt => self.change_stmt(node),
            NodeKind::IfStmt => self.if_stmt(node),
            NodeKind::WhileStmt => self.while_stmt(node),
            NodeKind::ForStmt => self.for_stmt(node),
            NodeKind::ReturnStmt => self.return_stmt(node),
            NodeKind::FuncDecl => self.func_decl(node),
            NodeKind::DebuggerStmt => {
                self.emit(Op::Debugger);
                Ok(())
            }
            NodeKind::Block => self.bare_block(node),
            NodeKind::ExprStmt => self.expr_stmt(node, keep_value),
            kind => Err(CompileError::syntax(
                format!("expected a statement, found {kind:?}"),
                node.span(),
            )),
        };
        self.span = saved;
        result
    }

    fn init_stmt<C: SyntaxCursor>(&mut self, node: &C) -> Result<()> {
        let parts = self.parts_min(node, 2)?;
        let catch = parts[0].kind() == NodeKind::CatchKw;
        let name_node = &parts[usize::from(catch)];
        let name = self.ident(name_node)?;
        let value = parts
            .get(usize::from(catch) + 1)
            .ok_or_else(|| CompileError::syntax("init is missing a value", node.span()))?;
        self.expression(value)?;
        self.declare(&name, name_node.span());
        self.emit(Op::Init { name, catch });
        Ok(())
    }

    fn ref_stmt<C: SyntaxCursor>(&mut self, node: &C) -> Result<()> {
        let parts = self.parts_min(node, 2)?;
        let name = self.ident(&parts[0])?;
        self.expression(&parts[1])?;
        self.declare(&name, parts[0].span());
        self.emit(Op::Ref { name });
        Ok(())
    }

    fn change_stmt<C: SyntaxCursor>(&mut self, node: &C) -> Result<()> {
        let parts = self.parts_min(node, 2)?;
        let (target, value) = (&parts[0], &parts[1]);
        match target.kind() {
            NodeKind::Identifier => {
                let name = self.ident(target)?;
                self.check_defined(&name, target.span());
                self.expression(value)?;
                self.emit(Op::Store { name });
            }
            NodeKind::MemberExpr => {
                let member = self.parts_min(target, 2)?;
                let name = self.text(&member[1]).to_string();
                self.expression(&member[0])?;
                self.expression(value)?;
                self.emit(Op::MemberStore { name });
            }
            NodeKind::IndexExpr => {
                let index = self.parts_min(target, 2)?;
                self.expression(&index[0])?;
                self.expression(&index[1])?;
                self.expression(value)?;
                self.emit(Op::IndexStore);
            }
            kind => {
                return Err(CompileError::syntax(
                    format!("cannot assign to {kind:?}"),
                    target.span(),
                ));
            }
        }
        Ok(())
    }

    /// Block in its own runtime scope; enter and exit carry `span`
    fn scoped_block<C: SyntaxCursor>(&mut self, block: &C, span: Span) -> Result<()> {
        if block.kind() != NodeKind::Block {
            return Err(CompileError::syntax(
                format!("expected a block, found {:?}", block.kind()),
                block.span(),
            ));
        }
        self.emit_at(Op::EnterScope, span);
        self.names.enter();
        self.statements(block, false)?;
        self.names.exit();
        self.emit_at(Op::ExitScope, span);
        Ok(())
    }

    fn bare_block<C: SyntaxCursor>(&mut self, node: &C) -> Result<()> {
        let braces: Vec<C> = children_of(node)
            .into_iter()
            .filter(|c| c.kind() == NodeKind::Punct)
            .collect();
        let open = braces.first().map_or(node.span(), |c| c.span());
        let close = braces.last().map_or(node.span(), |c| c.span());
        self.emit_at(Op::EnterScope, open);
        self.names.enter();
        self.statements(node, false)?;
        self.names.exit();
        self.emit_at(Op::ExitScope, close);
        Ok(())
    }

    fn if_stmt<C: SyntaxCursor>(&mut self, node: &C) -> Result<()> {
        let parts = self.parts_min(node, 2)?;
        let header = parts[0].span();
        self.span = header;
        self.expression(&parts[0])?;
        let to_else = self.emit(Op::JumpIfFalse { target: 0 });
        self.scoped_block(&parts[1], header)?;

        match parts.get(2) {
            Some(alternative) => {
                let to_end = self.emit_at(Op::Jump { target: 0 }, header);
                self.patch_jump(to_else)?;
                match alternative.kind() {
                    NodeKind::IfStmt => self.statement(alternative, false)?,
                    _ => self.scoped_block(alternative, header)?,
                }
                self.patch_jump(to_end)?;
            }
            None => self.patch_jump(to_else)?,
        }
        Ok(())
    }

    fn while_stmt<C: SyntaxCursor>(&mut self, node: &C) -> Result<()> {
        let parts = self.parts_min(node, 2)?;
        let header = parts[0].span();
        self.span = header;
        let loop_start = self.code.len();
        self.expression(&parts[0])?;
        let to_end = self.emit(Op::JumpIfFalse { target: 0 });
        self.scoped_block(&parts[1], header)?;
        self.emit_at(Op::Jump { target: loop_start }, header);
        self.patch_jump(to_end)
    }

    fn for_stmt<C: SyntaxCursor>(&mut self, node: &C) -> Result<()> {
        let parts = self.parts_min(node, 3)?;
        let (var, iterable, body) = (&parts[0], &parts[1], &parts[2]);
        let name = self.ident(var)?;
        let header = var.span().merge(iterable.span());
        self.span = header;

        self.expression(iterable)?;
        self.emit(Op::GetIter);
        let loop_start = self.emit(Op::IterNext);
        let to_end = self.emit(Op::JumpIfFalse { target: 0 });

        // Each iteration gets a fresh scope holding the loop variable
        self.emit(Op::EnterScope);
        self.names.enter();
        self.declare(&name, var.span());
        self.emit(Op::Init { name, catch: false });
        if body.kind() != NodeKind::Block {
            return Err(CompileError::syntax("expected a loop body block", body.span()));
        }
        self.statements(body, false)?;
        self.names.exit();
        self.emit_at(Op::ExitScope, header);
        self.emit_at(Op::Jump { target: loop_start }, header);
        self.patch_jump(to_end)
    }

    fn return_stmt<C: SyntaxCursor>(&mut self, node: &C) -> Result<()> {
        match self.parts(node)?.first() {
            Some(value) => self.expression(value)?,
            None => {
                self.emit(Op::Push {
                    value: Immediate::Nil,
                });
            }
        }
        self.emit(Op::Ret);
        Ok(())
    }

    fn func_decl<C: SyntaxCursor>(&mut self, node: &C) -> Result<()> {
        let parts = self.parts_min(node, 3)?;
        let name = self.ident(&parts[0])?;
        self.span = Span::new(node.from(), parts[1].to());
        self.function(&parts[1], &parts[2], Some(name.clone()))?;
        // Already declared by the block's first pass
        self.emit(Op::Init { name, catch: false });
        Ok(())
    }

    fn expr_stmt<C: SyntaxCursor>(&mut self, node: &C, keep_value: bool) -> Result<()> {
        let parts = self.parts_min(node, 1)?;
        self.expression(&parts[0])?;
        if !keep_value {
            self.emit(Op::Pop);
        }
        Ok(())
    }

    /// Guarded function body followed by the closure construction
    fn function<C: SyntaxCursor>(
        &mut self,
        params: &C,
        body: &C,
        name: Option<String>,
    ) -> Result<()> {
        if body.kind() != NodeKind::Block {
            return Err(CompileError::syntax("expected a function body", body.span()));
        }
        let guard = self.emit(Op::Jump { target: 0 });
        let entry = self.code.len();

        self.names.enter();
        let params = self.parts(params)?;
        for param in &params {
            let param_name = self.ident(param)?;
            if !self.names.declare(&param_name) {
                self.diagnostic(format!("duplicate parameter '{param_name}'"), param.span());
            }
            self.emit(Op::Init {
                name: param_name,
                catch: false,
            });
        }
        self.statements(body, false)?;
        self.names.exit();

        let closing = children_of(body)
            .last()
            .map_or(body.span(), |brace| brace.span());
        self.emit_at(
            Op::Push {
                value: Immediate::Nil,
            },
            closing,
        );
        self.emit_at(Op::Ret, closing);
        self.patch_jump(guard)?;

        self.emit(Op::MakeClosure {
            entry,
            arity: params.len(),
            name,
        });
        Ok(())
    }

    // ---- expressions ----

    fn expression<C: SyntaxCursor>(&mut self, node: &C) -> Result<()> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.expression_inner(node))
    }

    fn expression_inner<C: SyntaxCursor>(&mut self, node: &C) -> Result<()> {
        match node.kind() {
            NodeKind::Number => {
                let value = self.number(node)?;
                self.emit(Op::Push {
                    value: Immediate::Number(value),
                });
            }
            NodeKind::String => {
                let text = self.text(node);
                let value = unescape(text).ok_or_else(|| {
                    CompileError::syntax("malformed string literal", node.span())
                })?;
                self.emit(Op::Push {
                    value: Immediate::Str(value),
                });
            }
            NodeKind::Boolean => {
                let value = self.text(node) == "true";
                self.emit(Op::Push {
                    value: Immediate::Bool(value),
                });
            }
            NodeKind::Nil => {
                self.emit(Op::Push {
                    value: Immediate::Nil,
                });
            }
            NodeKind::Identifier => {
                let name = self.ident(node)?;
                self.check_defined(&name, node.span());
                self.emit(Op::Load { name });
            }
            NodeKind::BinaryExpr => {
                let parts = self.parts_min(node, 3)?;
                let symbol = self.text(&parts[1]);
                let op = BinOp::from_symbol(symbol).ok_or_else(|| {
                    CompileError::syntax(format!("unknown operator `{symbol}`"), parts[1].span())
                })?;
                self.expression(&parts[0])?;
                self.expression(&parts[2])?;
                self.emit(Op::Binary { op });
            }
            NodeKind::UnaryExpr => {
                let parts = self.parts_min(node, 2)?;
                let op = match self.text(&parts[0]) {
                    "-" => UnOp::Neg,
                    "not" => UnOp::Not,
                    "~" => UnOp::BitNot,
                    other => {
                        return Err(CompileError::syntax(
                            format!("unknown unary operator `{other}`"),
                            parts[0].span(),
                        ));
                    }
                };
                self.expression(&parts[1])?;
                self.emit(Op::Unary { op });
            }
            NodeKind::ParenExpr => {
                let parts = self.parts_min(node, 1)?;
                self.expression(&parts[0])?;
            }
            NodeKind::CallExpr => self.call(node)?,
            NodeKind::MemberExpr => {
                let parts = self.parts_min(node, 2)?;
                let name = self.text(&parts[1]).to_string();
                self.expression(&parts[0])?;
                self.emit(Op::MemberLoad { name });
            }
            NodeKind::IndexExpr => {
                let parts = self.parts_min(node, 2)?;
                self.expression(&parts[0])?;
                self.expression(&parts[1])?;
                self.emit(Op::IndexLoad);
            }
            NodeKind::ListLiteral | NodeKind::TupleLiteral => {
                let items = self.parts(node)?;
                for item in &items {
                    self.expression(item)?;
                }
                let len = items.len();
                self.emit(if node.kind() == NodeKind::ListLiteral {
                    Op::MakeList { len }
                } else {
                    Op::MakeTuple { len }
                });
            }
            NodeKind::MapLiteral => {
                let entries = self.parts(node)?;
                for entry in &entries {
                    let kv = self.parts_min(entry, 2)?;
                    let key = match kv[0].kind() {
                        NodeKind::String => unescape(self.text(&kv[0])).ok_or_else(|| {
                            CompileError::syntax("malformed string literal", kv[0].span())
                        })?,
                        _ => self.text(&kv[0]).to_string(),
                    };
                    self.emit(Op::Push {
                        value: Immediate::Str(key),
                    });
                    self.expression(&kv[1])?;
                }
                self.emit(Op::MakeMap { len: entries.len() });
            }
            NodeKind::FuncLiteral => {
                let parts = self.parts_min(node, 2)?;
                self.function(&parts[0], &parts[1], None)?;
            }
            NodeKind::Error => return Err(self.error_node(node)),
            kind => {
                return Err(CompileError::syntax(
                    format!("expected an expression, found {kind:?}"),
                    node.span(),
                ));
            }
        }
        Ok(())
    }

    /// Integer literals that fit `i32` stay integers; anything else is `f64`
    fn number<C: SyntaxCursor>(&self, node: &C) -> Result<Number> {
        let text = self.text(node);
        let malformed = || CompileError::syntax(format!("malformed number {text:?}"), node.span());
        if text.contains(['.', 'e', 'E']) {
            return text.parse::<f64>().map(Number::F64).map_err(|_| malformed());
        }
        match text.parse::<i64>() {
            Ok(v) => Ok(i32::try_from(v).map_or(Number::F64(v as f64), Number::I32)),
            Err(_) => text.parse::<f64>().map(Number::F64).map_err(|_| malformed()),
        }
    }

    fn call<C: SyntaxCursor>(&mut self, node: &C) -> Result<()> {
        let parts = self.parts_min(node, 2)?;
        let (callee, arg_list) = (&parts[0], &parts[1]);
        let args = self.parts(arg_list)?;

        if callee.kind() == NodeKind::Identifier {
            let name = self.text(callee);
            if name == TYPEOF {
                if args.len() != 1 {
                    self.diagnostic(
                        format!("typeof expects exactly 1 argument, got {}", args.len()),
                        node.span(),
                    );
                }
                match args.first() {
                    Some(arg) => self.expression(arg)?,
                    None => {
                        self.emit(Op::Push {
                            value: Immediate::Nil,
                        });
                    }
                }
                self.emit(Op::Typeof);
                return Ok(());
            }
            if self.foreign.contains(name) && !self.names.resolves(name) {
                for arg in &args {
                    self.expression(arg)?;
                }
                self.emit(Op::CallForeign {
                    name: name.to_string(),
                    argc: args.len(),
                });
                return Ok(());
            }
        }

        self.expression(callee)?;
        for arg in &args {
            self.expression(arg)?;
        }
        self.emit(Op::Call { argc: args.len() });
        Ok(())
    }
}
