//! Property-tree registration glue
//!
//! The configuration layer above this crate exposes tunable parameters at
//! named paths. This module provides the registration surface: a flat tree
//! of `/`-separated paths whose nodes carry an optional coercer (request to
//! applied value) and coerced subscribers. Registering the RX front-end
//! wires its setters in as those hooks, so the tree, not the caller, holds
//! the authoritative applied values.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use num_complex::Complex64;

use crate::error::{CoreError, CoreResult};
use crate::rx_frontend::{self, RxFrontendCore};

/// Value stored at a tree node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropValue {
    /// Boolean flag
    Bool(bool),
    /// Complex correction value
    Complex(Complex64),
    /// Closed numeric interval advertising a parameter's bounds
    Range { start: f64, stop: f64 },
}

impl PropValue {
    /// The boolean payload, if this is a `Bool`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The complex payload, if this is a `Complex`
    pub fn as_complex(&self) -> Option<Complex64> {
        match self {
            PropValue::Complex(c) => Some(*c),
            _ => None,
        }
    }
}

/// Coercer hook: maps a requested value to the applied value
pub type Coercer = Box<dyn FnMut(PropValue) -> CoreResult<PropValue> + Send>;
/// Subscriber hook: invoked with each applied value
pub type Subscriber = Box<dyn FnMut(&PropValue) -> CoreResult<()> + Send>;

/// One tunable parameter node
pub struct Property {
    value: PropValue,
    coercer: Option<Coercer>,
    subscribers: Vec<Subscriber>,
}

impl Property {
    /// Install the coercer mapping a requested value to the applied one.
    /// At most one coercer per node; the last installed wins.
    pub fn set_coercer(&mut self, coercer: Coercer) -> &mut Self {
        self.coercer = Some(coercer);
        self
    }

    /// Add a subscriber invoked with every applied (post-coercion) value
    pub fn add_coerced_subscriber(&mut self, subscriber: Subscriber) -> &mut Self {
        self.subscribers.push(subscriber);
        self
    }
}

/// Flat tree of `/`-separated parameter paths
#[derive(Default)]
pub struct PropertyTree {
    nodes: HashMap<String, Property>,
}

impl PropertyTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node at `path` with an initial value, replacing any
    /// existing node. Returns the node for hook installation.
    pub fn create(&mut self, path: &str, value: PropValue) -> &mut Property {
        let node = self.nodes.entry(path.to_string()).or_insert_with(|| Property {
            value,
            coercer: None,
            subscribers: Vec::new(),
        });
        node.value = value;
        node.coercer = None;
        node.subscribers.clear();
        node
    }

    /// Check whether a node exists at `path`
    pub fn exists(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    /// Set a parameter: run the coercer, store the applied value, notify
    /// subscribers, and return the applied value. Callers must treat the
    /// return as the authoritative setting.
    pub fn set(&mut self, path: &str, requested: PropValue) -> CoreResult<PropValue> {
        let node = self
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoreError::UnknownProperty(path.to_string()))?;

        let applied = match node.coercer.as_mut() {
            Some(coerce) => coerce(requested)?,
            None => requested,
        };
        for subscriber in node.subscribers.iter_mut() {
            subscriber(&applied)?;
        }
        node.value = applied;
        Ok(applied)
    }

    /// Read the stored (applied) value at `path`
    pub fn get(&self, path: &str) -> CoreResult<PropValue> {
        self.nodes
            .get(path)
            .map(|node| node.value)
            .ok_or_else(|| CoreError::UnknownProperty(path.to_string()))
    }
}

/// Shared handle to a front-end core, as captured by the tree hooks
pub type SharedRxFrontend = Arc<Mutex<RxFrontendCore>>;

fn lock(core: &SharedRxFrontend) -> CoreResult<MutexGuard<'_, RxFrontendCore>> {
    core.lock()
        .map_err(|_| CoreError::BusUnavailable("front-end core lock poisoned".to_string()))
}

fn join(prefix: &str, leaf: &str) -> String {
    if prefix.is_empty() {
        leaf.to_string()
    } else {
        format!("{}/{}", prefix, leaf)
    }
}

/// Register the front-end's tunable parameters under `prefix`:
///
/// - `dc_offset/range`: advertised offset bounds
/// - `dc_offset/value`: coerced through [`RxFrontendCore::set_dc_offset`]
/// - `dc_offset/enable`: subscribed to [`RxFrontendCore::set_dc_offset_auto`]
/// - `iq_balance/value`: subscribed to [`RxFrontendCore::set_iq_balance`]
pub fn register_rx_frontend(core: &SharedRxFrontend, tree: &mut PropertyTree, prefix: &str) {
    tree.create(
        &join(prefix, "dc_offset/range"),
        PropValue::Range {
            start: rx_frontend::DC_OFFSET_MIN,
            stop: rx_frontend::DC_OFFSET_MAX,
        },
    );

    let dc_value_path = join(prefix, "dc_offset/value");
    let handle = Arc::clone(core);
    let path = dc_value_path.clone();
    tree.create(
        &dc_value_path,
        PropValue::Complex(rx_frontend::DEFAULT_DC_OFFSET),
    )
    .set_coercer(Box::new(move |requested| {
        let offset = requested.as_complex().ok_or_else(|| CoreError::PropertyType {
            path: path.clone(),
            expected: "complex",
        })?;
        let applied = lock(&handle)?.set_dc_offset(offset)?;
        Ok(PropValue::Complex(applied))
    }));

    let dc_enable_path = join(prefix, "dc_offset/enable");
    let handle = Arc::clone(core);
    let path = dc_enable_path.clone();
    tree.create(
        &dc_enable_path,
        PropValue::Bool(rx_frontend::DEFAULT_DC_OFFSET_AUTO),
    )
    .add_coerced_subscriber(Box::new(move |applied| {
        let enable = applied.as_bool().ok_or_else(|| CoreError::PropertyType {
            path: path.clone(),
            expected: "bool",
        })?;
        lock(&handle)?.set_dc_offset_auto(enable)
    }));

    let iq_value_path = join(prefix, "iq_balance/value");
    let handle = Arc::clone(core);
    let path = iq_value_path.clone();
    tree.create(
        &iq_value_path,
        PropValue::Complex(rx_frontend::DEFAULT_IQ_BALANCE),
    )
    .add_coerced_subscriber(Box::new(move |applied| {
        let correction = applied.as_complex().ok_or_else(|| CoreError::PropertyType {
            path: path.clone(),
            expected: "complex",
        })?;
        lock(&handle)?.set_iq_balance(correction)
    }));
}
