use super::container::AttributeContainer;
use super::{AttributeFilter, AttributeTree, Attributes, TreeIter};
use crate::AttributeValue;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

type InheritedIter = Box<dyn Iterator<Item = (String, AttributeValue)> + Send>;

/// Where a container's inherited values come from.
#[derive(Clone, Debug)]
pub(super) enum Inherited {
    /// A frozen tree built from a plain map.
    Map(Arc<AttributeTree>),
    /// A parent container.
    Container(AttributeContainer),
}

impl Inherited {
    pub(super) fn get(&self, key: &str) -> Option<AttributeValue> {
        match self {
            Inherited::Map(tree) => tree.get(key).cloned(),
            Inherited::Container(parent) => parent.get(key),
        }
    }

    pub(super) fn has(&self, key: &str) -> bool {
        match self {
            Inherited::Map(tree) => tree.contains_key(key),
            Inherited::Container(parent) => parent.has(key),
        }
    }

    fn iter(self) -> InheritedIter {
        match self {
            Inherited::Map(tree) => Box::new(TreeIter::new(tree)),
            Inherited::Container(parent) => Box::new(parent.entries().map(|(k, v, _)| (k, v))),
        }
    }
}

/// Lazy iterator over the entries visible through an
/// [`AttributeContainer`], created by [`AttributeContainer::entries`].
///
/// Local entries come first, in insertion order. Inherited entries follow,
/// skipping keys overridden or deleted locally. Values a snapshot preserved
/// from its source are inherited entries and come before the live ones. The local part reflects the
/// container as it was when the iterator was created; the inherited part is
/// read from the source when the local part is exhausted.
pub struct Entries {
    local: TreeIter<Arc<AttributeTree>>,
    local_tree: Arc<AttributeTree>,
    deleted: Arc<HashSet<String>>,
    frozen: Arc<Attributes>,
    frozen_pos: usize,
    source: Option<Inherited>,
    inherited: Option<InheritedIter>,
}

impl Entries {
    pub(super) fn new(
        local: Arc<AttributeTree>,
        deleted: Arc<HashSet<String>>,
        frozen: Arc<Attributes>,
        source: Option<Inherited>,
    ) -> Self {
        Entries {
            local: TreeIter::new(local.clone()),
            local_tree: local,
            deleted,
            frozen,
            frozen_pos: 0,
            source,
            inherited: None,
        }
    }
}

impl fmt::Debug for Entries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entries")
            .field("local", &self.local_tree.len())
            .field("deleted", &self.deleted.len())
            .field("frozen", &self.frozen.len())
            .field("source", &self.source)
            .finish()
    }
}

impl Iterator for Entries {
    type Item = (String, AttributeValue, AttributeFilter);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((key, value)) = self.local.next() {
            return Some((key, value, AttributeFilter::Local));
        }
        while let Some((key, value)) = self.frozen.get_index(self.frozen_pos) {
            self.frozen_pos += 1;
            if !self.local_tree.contains_key(key) && !self.deleted.contains(key) {
                return Some((key.clone(), value.clone(), AttributeFilter::Inherited));
            }
        }
        if self.inherited.is_none() {
            self.inherited = Some(self.source.take()?.iter());
        }
        let inherited = self.inherited.as_mut()?;
        for (key, value) in inherited.by_ref() {
            if !self.local_tree.contains_key(&key)
                && !self.deleted.contains(&key)
                && !self.frozen.contains_key(&key)
            {
                return Some((key, value, AttributeFilter::Inherited));
            }
        }
        None
    }
}
