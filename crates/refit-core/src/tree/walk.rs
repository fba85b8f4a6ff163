/*!
# Tree Walking Utilities

Depth-first searches over [`Node`] trees. Every search visits children in
source order.
*/

use super::Node;

/// Stateless depth-first walker
pub struct TreeWalker;

impl TreeWalker {
    /// Find all nodes matching a predicate, outermost first
    pub fn find_all<'a, F>(root: &'a Node, predicate: F) -> Vec<&'a Node>
    where
        F: Fn(&Node) -> bool,
    {
        let mut matches = Vec::new();
        Self::find_all_recursive(root, &predicate, &mut matches);
        matches
    }

    /// Find the first node matching a predicate in pre-order
    pub fn find_first<'a, F>(root: &'a Node, predicate: F) -> Option<&'a Node>
    where
        F: Fn(&Node) -> bool,
    {
        Self::find_first_recursive(root, &predicate)
    }

    /// Visit every node together with its ancestors, root first
    pub fn walk_with_path<'a, F>(root: &'a Node, mut visit: F)
    where
        F: FnMut(&'a Node, &[&'a Node]),
    {
        let mut path = Vec::new();
        Self::walk_recursive(root, &mut path, &mut visit);
    }

    /// Ancestors of `target` (compared by address), root first.
    /// `None` when `target` is not inside `root`.
    pub fn path_to<'a>(root: &'a Node, target: &Node) -> Option<Vec<&'a Node>> {
        let mut path = Vec::new();
        if Self::path_recursive(root, target, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn find_all_recursive<'a, F>(node: &'a Node, predicate: &F, matches: &mut Vec<&'a Node>)
    where
        F: Fn(&Node) -> bool,
    {
        if predicate(node) {
            matches.push(node);
        }
        for child in node.children() {
            Self::find_all_recursive(child, predicate, matches);
        }
    }

    fn find_first_recursive<'a, F>(node: &'a Node, predicate: &F) -> Option<&'a Node>
    where
        F: Fn(&Node) -> bool,
    {
        if predicate(node) {
            return Some(node);
        }
        node.children()
            .into_iter()
            .find_map(|child| Self::find_first_recursive(child, predicate))
    }

    fn walk_recursive<'a, F>(node: &'a Node, path: &mut Vec<&'a Node>, visit: &mut F)
    where
        F: FnMut(&'a Node, &[&'a Node]),
    {
        visit(node, path);
        path.push(node);
        for child in node.children() {
            Self::walk_recursive(child, path, visit);
        }
        path.pop();
    }

    fn path_recursive<'a>(node: &'a Node, target: &Node, path: &mut Vec<&'a Node>) -> bool {
        if std::ptr::eq(node, target) {
            return true;
        }
        path.push(node);
        for child in node.children() {
            if Self::path_recursive(child, target, path) {
                return true;
            }
        }
        path.pop();
        false
    }
}
