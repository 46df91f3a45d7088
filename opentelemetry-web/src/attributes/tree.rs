//! Dotted-key attribute tree.
//!
//! A key such as `http.request.method` is split on `.`; every segment but the
//! last names a branch and the last one names a leaf holding the value. A
//! path can never be a leaf and a branch at the same time.
use super::AttributeError;
use crate::AttributeValue;
use indexmap::IndexMap;
use std::ops::Deref;

/// A node of an [`AttributeTree`].
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeNode {
    /// A stored value.
    Leaf(AttributeValue),
    /// Nested segments, in insertion order.
    Branch(AttributeBranch),
}

/// Children of a branch node, keyed by segment.
pub type AttributeBranch = IndexMap<String, AttributeNode>;

/// Splits a dotted key into its segments, rejecting empty keys and empty
/// segments (`"a..b"`, `".a"`).
pub(crate) fn split_key(key: &str) -> Result<Vec<&str>, AttributeError> {
    if key.is_empty() {
        return Err(AttributeError::EmptyKey);
    }
    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(AttributeError::InvalidKey(key.to_string()));
    }
    Ok(segments)
}

/// Hierarchical key/value store addressed by dotted keys.
///
/// Lookups are `O(depth)`. Iteration is a depth-first, pre-order walk that
/// yields leaves only, in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeTree {
    root: AttributeBranch,
    len: usize,
}

impl AttributeTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leaves in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the tree holds no leaves.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes every node.
    pub fn clear(&mut self) {
        self.root.clear();
        self.len = 0;
    }

    /// Top level segments of the tree.
    pub fn root(&self) -> &AttributeBranch {
        &self.root
    }

    /// Returns the value stored at `key`, if `key` names a leaf.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        let mut branch = &self.root;
        let mut segments = key.split('.').peekable();
        while let Some(segment) = segments.next() {
            match (branch.get(segment)?, segments.peek()) {
                (AttributeNode::Leaf(value), None) => return Some(value),
                (AttributeNode::Branch(children), Some(_)) => branch = children,
                _ => return None,
            }
        }
        None
    }

    /// Returns `true` if `key` names a leaf.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Checks whether `key` could be stored without a leaf/branch conflict.
    ///
    /// Returns `Ok(true)` if the key already exists as a leaf.
    pub fn check(&self, key: &str) -> Result<bool, AttributeError> {
        let segments = split_key(key)?;
        let mut branch = &self.root;
        for (idx, segment) in segments.iter().enumerate() {
            let is_last = idx == segments.len() - 1;
            match branch.get(*segment) {
                None => return Ok(false),
                Some(AttributeNode::Leaf(_)) if is_last => return Ok(true),
                Some(AttributeNode::Branch(children)) if !is_last => branch = children,
                Some(_) => return Err(AttributeError::StructuralConflict(key.to_string())),
            }
        }
        Ok(false)
    }

    /// Stores `value` at `key`, returning the value it replaced.
    ///
    /// Fails without modifying the tree if the key is malformed or if a
    /// segment on the path is already used with the other node kind.
    pub fn insert(
        &mut self,
        key: &str,
        value: AttributeValue,
    ) -> Result<Option<AttributeValue>, AttributeError> {
        self.check(key)?;
        let segments = split_key(key)?;
        let (last, parents) = segments
            .split_last()
            .ok_or(AttributeError::EmptyKey)?;
        let mut branch = &mut self.root;
        for segment in parents {
            let node = branch
                .entry((*segment).to_string())
                .or_insert_with(|| AttributeNode::Branch(AttributeBranch::new()));
            branch = match node {
                AttributeNode::Branch(children) => children,
                AttributeNode::Leaf(_) => {
                    return Err(AttributeError::StructuralConflict(key.to_string()))
                }
            };
        }
        match branch.insert((*last).to_string(), AttributeNode::Leaf(value)) {
            Some(AttributeNode::Leaf(previous)) => Ok(Some(previous)),
            Some(AttributeNode::Branch(_)) => {
                // `check` already rejected this shape
                Err(AttributeError::StructuralConflict(key.to_string()))
            }
            None => {
                self.len += 1;
                Ok(None)
            }
        }
    }

    /// Removes the leaf at `key`, pruning branches left empty.
    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        let segments = split_key(key).ok()?;
        let removed = remove_path(&mut self.root, &segments)?;
        self.len -= 1;
        Some(removed)
    }

    /// Iterates over `(key, value)` pairs.
    pub fn iter(&self) -> TreeIter<&AttributeTree> {
        TreeIter::new(self)
    }
}

fn remove_path(branch: &mut AttributeBranch, segments: &[&str]) -> Option<AttributeValue> {
    let (first, rest) = segments.split_first()?;
    if rest.is_empty() {
        if !matches!(branch.get(*first)?, AttributeNode::Leaf(_)) {
            return None;
        }
        return match branch.shift_remove(*first) {
            Some(AttributeNode::Leaf(value)) => Some(value),
            _ => None,
        };
    }
    let (removed, now_empty) = match branch.get_mut(*first)? {
        AttributeNode::Branch(children) => {
            let removed = remove_path(children, rest)?;
            (removed, children.is_empty())
        }
        AttributeNode::Leaf(_) => return None,
    };
    if now_empty {
        branch.shift_remove(*first);
    }
    Some(removed)
}

impl<K, V> FromIterator<(K, V)> for AttributeTree
where
    K: AsRef<str>,
    V: Into<AttributeValue>,
{
    /// Builds a tree, silently skipping keys that are malformed or conflict
    /// with an earlier key.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = AttributeTree::new();
        for (key, value) in iter {
            let _ = tree.insert(key.as_ref(), value.into());
        }
        tree
    }
}

/// Pull-based, depth-first cursor over the leaves of a tree.
///
/// The cursor keeps only the index of the current node at every depth and
/// re-walks the path from the root on each step, so it can own its tree
/// through any pointer type (`&AttributeTree`, `Arc<AttributeTree>`) without
/// borrowing into it.
#[derive(Clone, Debug)]
pub struct TreeIter<T> {
    tree: T,
    path: Vec<usize>,
}

impl<T: Deref<Target = AttributeTree>> TreeIter<T> {
    pub(crate) fn new(tree: T) -> Self {
        TreeIter {
            tree,
            path: vec![0],
        }
    }

    fn branch_at(&self, depth: usize) -> Option<&AttributeBranch> {
        let mut branch = &self.tree.root;
        for idx in &self.path[..depth] {
            match branch.get_index(*idx)? {
                (_, AttributeNode::Branch(children)) => branch = children,
                (_, AttributeNode::Leaf(_)) => return None,
            }
        }
        Some(branch)
    }

    fn key_for_path(&self) -> String {
        let mut key = String::new();
        let mut branch = &self.tree.root;
        for idx in &self.path {
            if let Some((segment, node)) = branch.get_index(*idx) {
                if !key.is_empty() {
                    key.push('.');
                }
                key.push_str(segment);
                if let AttributeNode::Branch(children) = node {
                    branch = children;
                }
            }
        }
        key
    }
}

impl<T: Deref<Target = AttributeTree>> Iterator for TreeIter<T> {
    type Item = (String, AttributeValue);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let depth = self.path.len().checked_sub(1)?;
            let idx = self.path[depth];
            let step = match self.branch_at(depth).and_then(|b| b.get_index(idx)) {
                None => None,
                Some((_, AttributeNode::Leaf(value))) => Some(Some(value.clone())),
                Some((_, AttributeNode::Branch(_))) => Some(None),
            };
            match step {
                // exhausted this branch, resume with the parent's next sibling
                None => {
                    self.path.pop();
                    if let Some(last) = self.path.last_mut() {
                        *last += 1;
                    }
                }
                Some(Some(value)) => {
                    let key = self.key_for_path();
                    self.path[depth] += 1;
                    return Some((key, value));
                }
                Some(None) => self.path.push(0),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tree(entries: &[(&str, &'static str)]) -> AttributeTree {
        entries.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn dotted_keys_nest() {
        let tree = tree(&[("a.b.c", "1"), ("a.b.d", "2"), ("a.e", "3"), ("f", "4")]);
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.get("a.b.c"), Some(&AttributeValue::from("1")));
        assert_eq!(tree.get("a.e"), Some(&AttributeValue::from("3")));
        assert_eq!(tree.get("a.b"), None, "branches carry no value");
        assert_eq!(tree.get("a.b.c.d"), None);
        assert!(matches!(tree.root().get("a"), Some(AttributeNode::Branch(_))));
    }

    #[test]
    fn overwrite_keeps_size() {
        let mut tree = AttributeTree::new();
        assert_eq!(tree.insert("a.b", "x".into()), Ok(None));
        assert_eq!(
            tree.insert("a.b", "y".into()),
            Ok(Some(AttributeValue::from("x")))
        );
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get("a.b"), Some(&AttributeValue::from("y")));
    }

    #[rstest]
    #[case("a", "a.b")]
    #[case("a.b", "a")]
    #[case("a.b", "a.b.c")]
    fn structural_conflicts_leave_tree_unchanged(#[case] first: &str, #[case] second: &str) {
        let mut tree = AttributeTree::new();
        tree.insert(first, "1".into()).unwrap();
        let before = tree.clone();
        assert_eq!(
            tree.insert(second, "2".into()),
            Err(AttributeError::StructuralConflict(second.to_string()))
        );
        assert_eq!(tree, before);
    }

    #[rstest]
    #[case("", AttributeError::EmptyKey)]
    #[case("a..b", AttributeError::InvalidKey("a..b".into()))]
    #[case(".a", AttributeError::InvalidKey(".a".into()))]
    fn malformed_keys(#[case] key: &str, #[case] expected: AttributeError) {
        let mut tree = AttributeTree::new();
        assert_eq!(tree.insert(key, true.into()), Err(expected));
        assert!(tree.is_empty());
    }

    #[test]
    fn remove_prunes_empty_branches() {
        let mut tree = tree(&[("a.b.c", "1"), ("x", "2")]);
        assert_eq!(tree.remove("a.b"), None, "cannot remove a branch");
        assert_eq!(tree.remove("a.b.c"), Some(AttributeValue::from("1")));
        assert_eq!(tree.len(), 1);
        assert!(tree.root().get("a").is_none());
        // the pruned path can now hold a leaf
        assert_eq!(tree.insert("a", "3".into()), Ok(None));
    }

    #[test]
    fn iteration_is_pre_order_depth_first() {
        let tree = tree(&[("a.b", "1"), ("c", "2"), ("a.d.e", "3"), ("a.f", "4"), ("g.h", "5")]);
        let keys: Vec<String> = tree.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a.b", "a.d.e", "a.f", "c", "g.h"]);
    }

    #[test]
    fn iteration_over_empty_tree() {
        assert_eq!(AttributeTree::new().iter().count(), 0);
    }

    #[test]
    fn owned_cursor() {
        let tree = std::sync::Arc::new(tree(&[("a.b", "1")]));
        let mut iter = TreeIter::new(tree.clone());
        assert_eq!(iter.next(), Some(("a.b".to_string(), AttributeValue::from("1"))));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }
}
