//! Concrete syntax tree and the cursor contract the compiler walks
//!
//! The compiler never touches `SyntaxTree` directly; it only needs something
//! implementing [`SyntaxCursor`]. The arena tree here is what the bundled
//! parser produces.

mod span;

pub use span::*;

use serde::Serialize;
use std::fmt::Write as _;

/// Node tags of the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NodeKind {
    Program,
    Block,

    // Trivia
    Punct,
    Keyword,
    LineComment,
    Error,

    // Statements
    InitStmt,
    RefStmt,
    ChangeStmt,
    IfStmt,
    WhileStmt,
    ForStmt,
    ReturnStmt,
    FuncDecl,
    DebuggerStmt,
    ExprStmt,

    // Expressions
    Number,
    String,
    Boolean,
    Nil,
    Identifier,
    BinaryExpr,
    UnaryExpr,
    ParenExpr,
    CallExpr,
    MemberExpr,
    IndexExpr,
    ListLiteral,
    TupleLiteral,
    MapLiteral,
    FuncLiteral,

    // Pieces
    CatchKw,
    Operator,
    ArgList,
    ParamList,
    PropertyName,
    MapEntry,
}

impl NodeKind {
    /// Nodes the compiler skips when lowering children
    pub fn is_trivia(self) -> bool {
        matches!(self, NodeKind::Punct | NodeKind::Keyword | NodeKind::LineComment)
    }

    pub fn is_statement(self) -> bool {
        matches!(
            self,
            NodeKind::InitStmt
                | NodeKind::RefStmt
                | NodeKind::ChangeStmt
                | NodeKind::IfStmt
                | NodeKind::WhileStmt
                | NodeKind::ForStmt
                | NodeKind::ReturnStmt
                | NodeKind::FuncDecl
                | NodeKind::DebuggerStmt
                | NodeKind::ExprStmt
                | NodeKind::Block
        )
    }
}

/// Cursor-style traversal over a syntax tree.
///
/// Navigation methods return `false` and leave the cursor in place when the
/// requested node does not exist.
pub trait SyntaxCursor: Clone {
    fn kind(&self) -> NodeKind;
    fn from(&self) -> usize;
    fn to(&self) -> usize;
    fn first_child(&mut self) -> bool;
    fn next_sibling(&mut self) -> bool;
    fn parent(&mut self) -> bool;

    fn span(&self) -> Span {
        Span::new(self.from(), self.to())
    }
}

/// Index of a node inside a [`SyntaxTree`]
pub type NodeId = usize;

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    span: Span,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Position in the parent's child list
    slot: usize,
}

/// Arena-allocated concrete syntax tree
#[derive(Debug, Clone, Default)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node and adopt `children`
    pub fn alloc(&mut self, kind: NodeKind, span: Span, children: Vec<NodeId>) -> NodeId {
        let id = self.nodes.len();
        for (slot, &child) in children.iter().enumerate() {
            let node = &mut self.nodes[child];
            node.parent = Some(id);
            node.slot = slot;
        }
        self.nodes.push(Node {
            kind,
            span,
            parent: None,
            children,
            slot: 0,
        });
        id
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id].span
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Cursor positioned on the root node
    pub fn cursor(&self) -> TreeCursor<'_> {
        TreeCursor {
            tree: self,
            node: self.root.unwrap_or(0),
        }
    }

    /// Whether any reachable node is an error node
    pub fn has_errors(&self) -> bool {
        self.root.is_some_and(|root| self.contains_error(root))
    }

    fn contains_error(&self, root: NodeId) -> bool {
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            let node = &self.nodes[id];
            if node.kind == NodeKind::Error {
                return true;
            }
            pending.extend(node.children.iter().copied());
        }
        false
    }

    /// Indented rendering of the tree, one node per line
    pub fn dump(&self, source: &str) -> String {
        let mut out = String::new();
        let mut pending: Vec<(NodeId, usize)> = self.root.map(|root| (root, 0)).into_iter().collect();
        while let Some((id, depth)) = pending.pop() {
            let node = &self.nodes[id];
            let _ = write!(out, "{}{:?} {}", "  ".repeat(depth), node.kind, node.span);
            if node.children.is_empty() {
                let _ = write!(out, " {:?}", node.span.slice(source));
            }
            out.push('\n');
            // Reversed so the first child is rendered first
            pending.extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
        }
        out
    }
}

/// [`SyntaxCursor`] over a [`SyntaxTree`]
#[derive(Debug, Clone, Copy)]
pub struct TreeCursor<'t> {
    tree: &'t SyntaxTree,
    node: NodeId,
}

impl TreeCursor<'_> {
    pub fn node(&self) -> NodeId {
        self.node
    }
}

impl SyntaxCursor for TreeCursor<'_> {
    fn kind(&self) -> NodeKind {
        self.tree.nodes[self.node].kind
    }

    fn from(&self) -> usize {
        self.tree.nodes[self.node].span.start
    }

    fn to(&self) -> usize {
        self.tree.nodes[self.node].span.end
    }

    fn first_child(&mut self) -> bool {
        match self.tree.nodes[self.node].children.first() {
            Some(&child) => {
                self.node = child;
                true
            }
            None => false,
        }
    }

    fn next_sibling(&mut self) -> bool {
        let node = &self.tree.nodes[self.node];
        let Some(parent) = node.parent else {
            return false;
        };
        match self.tree.nodes[parent].children.get(node.slot + 1) {
            Some(&next) => {
                self.node = next;
                true
            }
            None => false,
        }
    }

    fn parent(&mut self) -> bool {
        match self.tree.nodes[self.node].parent {
            Some(parent) => {
                self.node = parent;
                true
            }
            None => false,
        }
    }
}

/// Collect the direct children of the node under `cursor`
pub fn children_of<C: SyntaxCursor>(cursor: &C) -> Vec<C> {
    let mut out = Vec::new();
    let mut child = cursor.clone();
    if child.first_child() {
        loop {
            out.push(child.clone());
            if !child.next_sibling() {
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SyntaxTree {
        // Program(ExprStmt(Identifier, Punct))
        let mut tree = SyntaxTree::new();
        let ident = tree.alloc(NodeKind::Identifier, Span::new(0, 1), vec![]);
        let semi = tree.alloc(NodeKind::Punct, Span::new(1, 2), vec![]);
        let stmt = tree.alloc(NodeKind::ExprStmt, Span::new(0, 2), vec![ident, semi]);
        let root = tree.alloc(NodeKind::Program, Span::new(0, 2), vec![stmt]);
        tree.set_root(root);
        tree
    }

    #[test]
    fn test_cursor_navigation() {
        let tree = sample();
        let mut cursor = tree.cursor();
        assert_eq!(cursor.kind(), NodeKind::Program);
        assert!(cursor.first_child());
        assert_eq!(cursor.kind(), NodeKind::ExprStmt);
        assert!(!cursor.next_sibling());
        assert!(cursor.first_child());
        assert_eq!(cursor.kind(), NodeKind::Identifier);
        assert!(cursor.next_sibling());
        assert_eq!(cursor.kind(), NodeKind::Punct);
        assert_eq!(cursor.span(), Span::new(1, 2));
        assert!(!cursor.first_child());
        assert!(cursor.parent());
        assert_eq!(cursor.kind(), NodeKind::ExprStmt);
        assert!(cursor.parent());
        assert!(!cursor.parent());
    }

    #[test]
    fn test_children_of() {
        let tree = sample();
        let mut cursor = tree.cursor();
        cursor.first_child();
        let kinds: Vec<_> = children_of(&cursor).iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec![NodeKind::Identifier, NodeKind::Punct]);
    }

    #[test]
    fn test_dump() {
        let tree = sample();
        let dump = tree.dump("x;");
        assert!(dump.starts_with("Program 0..2\n"));
        assert!(dump.contains("    Identifier 0..1 \"x\""));
    }

    #[test]
    fn test_trivia_kinds() {
        assert!(NodeKind::Punct.is_trivia());
        assert!(NodeKind::LineComment.is_trivia());
        assert!(!NodeKind::Error.is_trivia());
        assert!(!NodeKind::CatchKw.is_trivia());
    }
}
