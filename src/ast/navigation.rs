//! Navigable AST View
//!
//! A read-only cursor layer over an [`Ast`] offering parent, children,
//! descendant, and pre-order walks plus variant filtering. The view is
//! built on ego-tree for O(1) parent/child navigation, with a node
//! cache mapping expression ids to tree nodes.
//!
//! The view is derived: it borrows the underlying AST, and because ASTs
//! are immutable the view can never go stale. Mutation produces a new
//! AST, for which a new view must be built.

use std::collections::HashMap;

use ego_tree::{NodeId, Tree};

use super::{Ast, Expr, ExprId, ExprVariant};

/// Navigable view over one AST.
pub struct NavigableAst<'a> {
    ast: &'a Ast,
    tree: Tree<ExprId>,
    node_cache: HashMap<ExprId, NodeId>,
    exprs: HashMap<ExprId, &'a Expr>,
}

impl<'a> NavigableAst<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        let root_expr = ast.root();
        let mut tree = Tree::new(root_expr.id);
        let mut node_cache = HashMap::new();
        let mut exprs = HashMap::new();
        node_cache.insert(root_expr.id, tree.root().id());
        exprs.insert(root_expr.id, root_expr);
        {
            let mut root_node = tree.root_mut();
            build_children(root_expr, &mut root_node, &mut node_cache, &mut exprs);
        }
        Self {
            ast,
            tree,
            node_cache,
            exprs,
        }
    }

    pub fn ast(&self) -> &'a Ast {
        self.ast
    }

    /// Cursor at the root expression.
    pub fn root(&self) -> NavigableExpr<'_, 'a> {
        NavigableExpr {
            view: self,
            node: self.tree.root().id(),
        }
    }

    /// Cursor at the node with the given id, if present.
    pub fn find(&self, id: ExprId) -> Option<NavigableExpr<'_, 'a>> {
        self.node_cache.get(&id).map(|&node| NavigableExpr {
            view: self,
            node,
        })
    }

    /// Every node of the tree in pre-order.
    pub fn all_nodes(&self) -> Vec<NavigableExpr<'_, 'a>> {
        self.root().all_nodes()
    }

    /// All nodes matching a predicate, in pre-order.
    pub fn filter(
        &self,
        mut predicate: impl FnMut(&NavigableExpr<'_, 'a>) -> bool,
    ) -> Vec<NavigableExpr<'_, 'a>> {
        self.all_nodes()
            .into_iter()
            .filter(|n| predicate(n))
            .collect()
    }

    /// All nodes of the given variant, in pre-order.
    pub fn nodes_of_variant(&self, variant: ExprVariant) -> Vec<NavigableExpr<'_, 'a>> {
        self.filter(|n| n.variant() == variant)
    }
}

fn build_children<'a>(
    expr: &'a Expr,
    parent_node: &mut ego_tree::NodeMut<'_, ExprId>,
    node_cache: &mut HashMap<ExprId, NodeId>,
    exprs: &mut HashMap<ExprId, &'a Expr>,
) {
    for child in expr.children() {
        let mut child_node = parent_node.append(child.id);
        node_cache.insert(child.id, child_node.id());
        exprs.insert(child.id, child);
        build_children(child, &mut child_node, node_cache, exprs);
    }
}

/// Cursor onto one node of a [`NavigableAst`].
#[derive(Clone, Copy)]
pub struct NavigableExpr<'v, 'a> {
    view: &'v NavigableAst<'a>,
    node: NodeId,
}

impl<'v, 'a> NavigableExpr<'v, 'a> {
    fn node_ref(&self) -> ego_tree::NodeRef<'v, ExprId> {
        self.view
            .tree
            .get(self.node)
            .expect("node ids come from this tree")
    }

    fn at(&self, node: NodeId) -> NavigableExpr<'v, 'a> {
        NavigableExpr {
            view: self.view,
            node,
        }
    }

    pub fn id(&self) -> ExprId {
        *self.node_ref().value()
    }

    /// The underlying expression node.
    pub fn expr(&self) -> &'a Expr {
        self.view.exprs[&self.id()]
    }

    pub fn variant(&self) -> ExprVariant {
        self.expr().variant()
    }

    pub fn parent(&self) -> Option<NavigableExpr<'v, 'a>> {
        self.node_ref().parent().map(|p| self.at(p.id()))
    }

    /// Immediate children in the deterministic structural order.
    pub fn children(&self) -> Vec<NavigableExpr<'v, 'a>> {
        self.node_ref()
            .children()
            .map(|c| self.at(c.id()))
            .collect()
    }

    /// All strict descendants, depth-first with children before their
    /// parents (post-order). The node itself is not included.
    pub fn descendants(&self) -> Vec<NavigableExpr<'v, 'a>> {
        let self_id = self.node;
        self.node_ref()
            .traverse()
            .filter_map(|edge| match edge {
                ego_tree::iter::Edge::Close(node) if node.id() != self_id => {
                    Some(self.at(node.id()))
                }
                _ => None,
            })
            .collect()
    }

    /// This node and all its descendants in pre-order.
    pub fn all_nodes(&self) -> Vec<NavigableExpr<'v, 'a>> {
        self.node_ref()
            .descendants()
            .map(|n| self.at(n.id()))
            .collect()
    }

    /// Distance from the root; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.node_ref().ancestors().count()
    }
}

impl std::fmt::Debug for NavigableExpr<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigableExpr")
            .field("id", &self.id())
            .field("variant", &self.variant())
            .finish()
    }
}
