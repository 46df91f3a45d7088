//! # Attribute containers
//!
//! Telemetry records (spans, log records) collect their attributes in an
//! [`AttributeContainer`]: a dotted-key store that can inherit from a parent
//! container or from a plain attribute map.
//!
//! * Reads resolve through the local tree first, then through the parent,
//!   unless the key was deleted locally (a *tombstone*).
//! * [`AttributeContainer::child`] creates either a *live* child, which always
//!   reflects the parent's current state, or a *snapshot* child, which keeps
//!   the parent's values as they were when the snapshot was taken. Snapshots
//!   copy a value only at the moment the parent is about to change it.
//! * Every mutation is reported to the listeners registered with
//!   [`AttributeContainer::listen`], together with qualifying mutations of
//!   ancestors.
//!
//! ```
//! use opentelemetry_web::attributes::{create_attribute_container, Config};
//!
//! let config = Config::default();
//! let parent = create_attribute_container(&config, "resource", None);
//! parent.set("service.name", "checkout");
//!
//! let live = parent.child("span", false);
//! let frozen = parent.child("export", true);
//! parent.set("service.name", "cart");
//!
//! assert_eq!(live.get("service.name"), Some("cart".into()));
//! assert_eq!(frozen.get("service.name"), Some("checkout".into()));
//! ```
use crate::AttributeValue;
use indexmap::IndexMap;
use thiserror::Error;

mod config;
mod container;
mod iter;
mod tree;

pub use config::{
    AttributeLimits, Config, OTEL_ATTRIBUTE_COUNT_LIMIT, OTEL_ATTRIBUTE_VALUE_LENGTH_LIMIT,
};
pub use container::{
    create_attribute_container, create_attribute_snapshot, AttributeContainer, AttributeSource,
    ListenerHandle,
};
pub use iter::Entries;
pub use tree::{AttributeBranch, AttributeNode, AttributeTree, TreeIter};

/// A flattened view of attributes, in iteration order.
pub type Attributes = IndexMap<String, AttributeValue>;

/// Reasons an attribute could not be stored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttributeError {
    /// The key was empty.
    #[error("attribute key must not be empty")]
    EmptyKey,

    /// The key contained an empty segment, e.g. `a..b`.
    #[error("attribute key '{0}' contains an empty segment")]
    InvalidKey(String),

    /// A segment of the key is already used as a leaf where a branch is
    /// needed, or the other way around.
    #[error("attribute key '{0}' conflicts with an existing leaf or branch")]
    StructuralConflict(String),

    /// Storing a new key would exceed the attribute count limit.
    #[error("attribute count limit of {limit} reached, dropping '{key}'")]
    CountLimitExceeded {
        /// The rejected key.
        key: String,
        /// The configured limit.
        limit: u32,
    },
}

/// Kind of change reported to listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeChangeOp {
    /// A key that did not resolve to any value now does.
    Add,
    /// A key that already resolved to a value, local or inherited, was set.
    Set,
    /// A key was deleted.
    Delete,
    /// All attributes were removed.
    Clear,
}

/// A change observed on a container or on one of its ancestors.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeChangeEvent {
    /// What happened.
    pub op: AttributeChangeOp,
    /// The affected key, `None` for [`AttributeChangeOp::Clear`].
    pub key: Option<String>,
    /// The new value for `Add` and `Set`.
    pub value: Option<AttributeValue>,
    /// The value visible before the change.
    pub previous: Option<AttributeValue>,
    /// For `Clear`: every attribute that was visible before the clear.
    pub cleared: Vec<(String, AttributeValue)>,
}

impl AttributeChangeEvent {
    pub(crate) fn keyed(
        op: AttributeChangeOp,
        key: &str,
        value: Option<AttributeValue>,
        previous: Option<AttributeValue>,
    ) -> Self {
        AttributeChangeEvent {
            op,
            key: Some(key.to_string()),
            value,
            previous,
            cleared: Vec::new(),
        }
    }

    pub(crate) fn clear(cleared: Vec<(String, AttributeValue)>) -> Self {
        AttributeChangeEvent {
            op: AttributeChangeOp::Clear,
            key: None,
            value: None,
            previous: None,
            cleared,
        }
    }
}

/// Restricts where [`AttributeContainer::has_with`] looks, and tags where an
/// entry yielded by [`AttributeContainer::entries`] came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AttributeFilter {
    /// Local values, then inherited ones not hidden by a tombstone.
    #[default]
    Any,
    /// Only the container's own tree.
    Local,
    /// Only the inheritance source, ignoring local overrides and tombstones.
    Inherited,
    /// The container's own tree, counting tombstoned keys as present.
    LocalOrDeleted,
}
