//! Navigable view over a checked AST.
//!
//! The view annotates every node with its parent, depth, height, and the
//! maximum expression id of its subtree, and serves pre-order and post-order
//! traversal without exposing mutation. Metadata lives in a flat arena laid
//! out in pre-order; the underlying AST exclusively owns its children and the
//! arena only back-references it.

use std::collections::HashMap;

use crate::ast::CheckedAst;
use crate::expr::{Expr, ExprId, ExprKind};

/// Default bound on tree depth while deriving metadata.
pub const DEFAULT_DEPTH_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigableError {
    /// Tree depth exceeded the configured limit during construction.
    #[error("recursion depth exceeded limit of {limit} while deriving tree metadata")]
    DepthLimitExceeded { limit: usize },
}

/// Visit order for traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalOrder {
    /// Root before children.
    #[default]
    Pre,
    /// Children before root.
    Post,
}

#[derive(Debug)]
struct NodeMeta<'a> {
    expr: &'a Expr,
    parent: Option<usize>,
    depth: usize,
    height: usize,
    max_id: ExprId,
    children: Vec<usize>,
}

/// Parent-linked, height- and max-id-annotated view of one AST.
///
/// Construction walks the tree once; the view may be cached per root and
/// shared freely, observations never alter the underlying AST.
#[derive(Debug)]
pub struct NavigableAst<'a> {
    nodes: Vec<NodeMeta<'a>>,
    by_id: HashMap<ExprId, usize>,
}

impl<'a> NavigableAst<'a> {
    /// Build the view with the default depth limit.
    pub fn build(ast: &'a CheckedAst) -> Result<Self, NavigableError> {
        Self::build_with_depth_limit(ast, DEFAULT_DEPTH_LIMIT)
    }

    pub fn build_with_depth_limit(
        ast: &'a CheckedAst,
        limit: usize,
    ) -> Result<Self, NavigableError> {
        Self::from_expr(&ast.expr, limit)
    }

    /// Build the view over a bare expression tree.
    pub fn from_expr(root: &'a Expr, limit: usize) -> Result<Self, NavigableError> {
        let mut nodes: Vec<NodeMeta<'a>> = Vec::new();
        let mut by_id = HashMap::new();

        // Pre-order arena layout: children are pushed in reverse so the
        // stack pops them in construction order.
        let mut stack: Vec<(&'a Expr, Option<usize>, usize)> = vec![(root, None, 0)];
        while let Some((expr, parent, depth)) = stack.pop() {
            if depth >= limit {
                return Err(NavigableError::DepthLimitExceeded { limit });
            }
            let index = nodes.len();
            if let Some(parent) = parent {
                nodes[parent].children.push(index);
            }
            by_id.insert(expr.id, index);
            nodes.push(NodeMeta {
                expr,
                parent,
                depth,
                height: 0,
                max_id: expr.id,
                children: Vec::new(),
            });
            for child in expr.children().into_iter().rev() {
                stack.push((child, Some(index), depth + 1));
            }
        }

        // Children sit after their parent in pre-order, so a reverse sweep
        // sees every child before its parent.
        for index in (0..nodes.len()).rev() {
            let (height, max_id) = {
                let meta = &nodes[index];
                let mut height = 0;
                let mut max_id = meta.expr.id;
                for &child in &meta.children {
                    height = height.max(nodes[child].height + 1);
                    max_id = max_id.max(nodes[child].max_id);
                }
                (height, max_id)
            };
            nodes[index].height = height;
            nodes[index].max_id = max_id;
        }

        Ok(Self { nodes, by_id })
    }

    pub fn root(&self) -> NavigableNode<'_> {
        NavigableNode { nav: self, index: 0 }
    }

    /// Look up a node by expression id.
    pub fn node(&self, id: ExprId) -> Option<NavigableNode<'_>> {
        self.by_id
            .get(&id)
            .map(|&index| NavigableNode { nav: self, index })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Indented text dump of the tree, one node per line.
    pub fn snapshot(&self) -> String {
        let mut out = String::new();
        let root_depth = self.nodes[0].depth;
        for node in self.root().all_nodes() {
            let indent = "  ".repeat(node.depth() - root_depth);
            out.push_str(&indent);
            out.push_str(&node_label(node.expr()));
            out.push_str(&format!(" @{}\n", node.id()));
        }
        out
    }
}

fn node_label(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Const(c) => format!("const {c}"),
        ExprKind::Ident(name) => format!("ident {name}"),
        ExprKind::Select(s) if s.test_only => format!("select has(.{})", s.field),
        ExprKind::Select(s) => format!("select .{}", s.field),
        ExprKind::Call(c) => format!("call {}", c.function),
        ExprKind::List(_) => "list".to_string(),
        ExprKind::Map(_) => "map".to_string(),
        ExprKind::Struct(s) => format!("struct {}", s.type_name),
        ExprKind::Comprehension(c) => format!("comprehension {}", c.iter_var),
    }
}

/// One node of the navigable view.
#[derive(Debug, Clone, Copy)]
pub struct NavigableNode<'a> {
    nav: &'a NavigableAst<'a>,
    index: usize,
}

impl<'a> NavigableNode<'a> {
    fn meta(&self) -> &'a NodeMeta<'a> {
        &self.nav.nodes[self.index]
    }

    /// The underlying expression.
    pub fn expr(&self) -> &'a Expr {
        self.meta().expr
    }

    pub fn id(&self) -> ExprId {
        self.meta().expr.id
    }

    pub fn kind_name(&self) -> &'static str {
        self.meta().expr.kind_name()
    }

    /// Parent node; empty for the root.
    pub fn parent(&self) -> Option<NavigableNode<'a>> {
        self.meta().parent.map(|index| NavigableNode {
            nav: self.nav,
            index,
        })
    }

    /// Distance from the tree root.
    pub fn depth(&self) -> usize {
        self.meta().depth
    }

    /// Maximum depth below this node; leaves are 0.
    pub fn height(&self) -> usize {
        self.meta().height
    }

    /// Maximum expression id within the subtree rooted here.
    pub fn max_id(&self) -> ExprId {
        self.meta().max_id
    }

    /// Direct children in payload construction order.
    pub fn children(&self) -> Vec<NavigableNode<'a>> {
        self.meta()
            .children
            .iter()
            .map(|&index| NavigableNode {
                nav: self.nav,
                index,
            })
            .collect()
    }

    /// Lazy pre-order traversal of the subtree rooted here, root included.
    pub fn all_nodes(&self) -> Nodes<'a> {
        self.all_nodes_in(TraversalOrder::Pre)
    }

    /// Lazy traversal of the subtree rooted here in the given order.
    pub fn all_nodes_in(&self, order: TraversalOrder) -> Nodes<'a> {
        Nodes {
            nav: self.nav,
            stack: vec![(self.index, false)],
            order,
        }
    }

    /// All nodes below this one, pre-order.
    pub fn descendants(&self) -> impl Iterator<Item = NavigableNode<'a>> + use<'a> {
        let root = self.index;
        self.all_nodes().filter(move |node| node.index != root)
    }
}

/// Collect the nodes of the subtree rooted at `root` whose depth relative to
/// it is at most `max_depth`.
///
/// A negative `max_depth` yields nothing; 0 yields only the root.
pub fn collect<'a>(
    root: NavigableNode<'a>,
    max_depth: i64,
    order: TraversalOrder,
) -> Vec<NavigableNode<'a>> {
    if max_depth < 0 {
        return Vec::new();
    }
    let base = root.depth() as i64;
    root.all_nodes_in(order)
        .filter(|node| node.depth() as i64 - base <= max_depth)
        .collect()
}

/// Lazy traversal iterator.
pub struct Nodes<'a> {
    nav: &'a NavigableAst<'a>,
    /// (index, children already expanded); the flag is only used post-order.
    stack: Vec<(usize, bool)>,
    order: TraversalOrder,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = NavigableNode<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.order {
            TraversalOrder::Pre => {
                let (index, _) = self.stack.pop()?;
                for &child in self.nav.nodes[index].children.iter().rev() {
                    self.stack.push((child, false));
                }
                Some(NavigableNode {
                    nav: self.nav,
                    index,
                })
            }
            TraversalOrder::Post => loop {
                let (index, expanded) = self.stack.pop()?;
                if expanded || self.nav.nodes[index].children.is_empty() {
                    return Some(NavigableNode {
                        nav: self.nav,
                        index,
                    });
                }
                self.stack.push((index, true));
                for &child in self.nav.nodes[index].children.iter().rev() {
                    self.stack.push((child, false));
                }
            },
        }
    }
}
