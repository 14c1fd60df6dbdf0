//! Edge-compressed radix tree keyed by strings.

use std::borrow::Cow;
use std::mem;

struct Node<V> {
    /// Edge label leading into this node. Empty only for the root.
    prefix: Vec<u8>,
    value: Option<V>,
    /// Sorted by the first byte of each child's prefix.
    children: Vec<Node<V>>,
}

impl<V> Node<V> {
    fn root() -> Self {
        Self {
            prefix: Vec::new(),
            value: None,
            children: Vec::new(),
        }
    }

    fn leaf(prefix: &[u8], value: V) -> Self {
        Self {
            prefix: prefix.to_vec(),
            value: Some(value),
            children: Vec::new(),
        }
    }

    fn child_index(&self, first: u8) -> Result<usize, usize> {
        self.children.binary_search_by_key(&first, |c| c.prefix[0])
    }

    fn add_child(&mut self, child: Node<V>) {
        match self.child_index(child.prefix[0]) {
            Ok(i) => self.children[i] = child,
            Err(i) => self.children.insert(i, child),
        }
    }
}

/// A radix tree mapping string keys to values.
///
/// Nodes without a value and with a single child are merged into that child,
/// so removing keys never leaves dead branches behind.
pub struct RadixTree<V> {
    root: Node<V>,
    len: usize,
}

impl<V> Default for RadixTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> RadixTree<V> {
    pub fn new() -> Self {
        Self {
            root: Node::root(),
            len: 0,
        }
    }

    /// Number of keys holding a value.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert `value` at `key`, returning the value it replaced.
    pub fn insert(&mut self, key: &str, value: V) -> Option<V> {
        let old = insert_node(&mut self.root, key.as_bytes(), value);
        if old.is_none() {
            self.len += 1;
        }
        old
    }

    /// Exact-match lookup.
    pub fn get(&self, key: &str) -> Option<&V> {
        let mut node = &self.root;
        let mut rest = key.as_bytes();

        loop {
            if rest.is_empty() {
                return node.value.as_ref();
            }

            let child = &node.children[node.child_index(rest[0]).ok()?];
            if !rest.starts_with(&child.prefix) {
                return None;
            }

            rest = &rest[child.prefix.len()..];
            node = child;
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        get_node_mut(&mut self.root, key.as_bytes())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove `key`, merging any branch it leaves without purpose.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let removed = remove_node(&mut self.root, key.as_bytes());
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Visit every key in lexical order.
    pub fn walk<F>(&self, mut f: F)
    where
        F: FnMut(&str, &V),
    {
        let mut path = Vec::new();
        walk_node(&self.root, &mut path, &mut f);
    }

    /// Visit every value mutably, removing keys for which `f` returns false.
    ///
    /// Returns the number of removed keys.
    pub fn retain<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&str, &mut V) -> bool,
    {
        let mut path = Vec::new();
        let mut removed = 0;
        retain_node(&mut self.root, &mut path, &mut f, &mut removed);
        self.len -= removed;
        removed
    }

    /// Number of nodes below the root.
    pub fn num_nodes(&self) -> usize {
        fn count<V>(node: &Node<V>) -> usize {
            node.children.iter().map(|c| 1 + count(c)).sum()
        }
        count(&self.root)
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn key_str(path: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(path)
}

fn insert_node<V>(node: &mut Node<V>, key: &[u8], value: V) -> Option<V> {
    if key.is_empty() {
        return node.value.replace(value);
    }

    let i = match node.child_index(key[0]) {
        Ok(i) => i,
        Err(i) => {
            node.children.insert(i, Node::leaf(key, value));
            return None;
        }
    };

    let child = &mut node.children[i];
    let common = common_prefix(&child.prefix, key);
    if common == child.prefix.len() {
        return insert_node(child, &key[common..], value);
    }

    // split the edge at the shared prefix
    let lower = Node {
        prefix: child.prefix.split_off(common),
        value: child.value.take(),
        children: mem::take(&mut child.children),
    };
    child.children.push(lower);

    if common == key.len() {
        child.value = Some(value);
    } else {
        child.add_child(Node::leaf(&key[common..], value));
    }

    None
}

fn get_node_mut<'a, V>(node: &'a mut Node<V>, key: &[u8]) -> Option<&'a mut V> {
    if key.is_empty() {
        return node.value.as_mut();
    }

    let i = node.child_index(key[0]).ok()?;
    let child = &mut node.children[i];
    if !key.starts_with(&child.prefix) {
        return None;
    }

    let len = child.prefix.len();
    get_node_mut(child, &key[len..])
}

fn remove_node<V>(node: &mut Node<V>, key: &[u8]) -> Option<V> {
    if key.is_empty() {
        return node.value.take();
    }

    let i = node.child_index(key[0]).ok()?;
    let child = &mut node.children[i];
    if !key.starts_with(&child.prefix) {
        return None;
    }

    let len = child.prefix.len();
    let removed = remove_node(child, &key[len..])?;
    compact_child(node, i);
    Some(removed)
}

/// Drop child `i` when it is empty, or merge it with its only child.
fn compact_child<V>(parent: &mut Node<V>, i: usize) {
    let child = &mut parent.children[i];
    if child.value.is_some() {
        return;
    }

    match child.children.len() {
        0 => {
            parent.children.remove(i);
        }
        1 => {
            if let Some(only) = child.children.pop() {
                child.prefix.extend_from_slice(&only.prefix);
                child.value = only.value;
                child.children = only.children;
            }
        }
        _ => {}
    }
}

fn walk_node<V, F>(node: &Node<V>, path: &mut Vec<u8>, f: &mut F)
where
    F: FnMut(&str, &V),
{
    if let Some(value) = &node.value {
        f(&key_str(path), value);
    }

    for child in &node.children {
        path.extend_from_slice(&child.prefix);
        walk_node(child, path, f);
        path.truncate(path.len() - child.prefix.len());
    }
}

fn retain_node<V, F>(node: &mut Node<V>, path: &mut Vec<u8>, f: &mut F, removed: &mut usize)
where
    F: FnMut(&str, &mut V) -> bool,
{
    if let Some(value) = node.value.as_mut() {
        if !f(&key_str(path), value) {
            node.value = None;
            *removed += 1;
        }
    }

    let mut i = 0;
    while i < node.children.len() {
        let len = node.children[i].prefix.len();
        path.extend_from_slice(&node.children[i].prefix);
        retain_node(&mut node.children[i], path, f, removed);
        path.truncate(path.len() - len);

        let before = node.children.len();
        compact_child(node, i);
        if node.children.len() == before {
            i += 1;
        }
    }
}
