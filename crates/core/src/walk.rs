#![forbid(unsafe_code)]

use crate::types::NodeRow;
use std::iter::Fuse;

/// What the walk needs to know about an item to pair parents with children.
pub trait TreePosition {
    fn tree_id(&self) -> i64;
    fn depth(&self) -> u32;
}

impl TreePosition for NodeRow {
    fn tree_id(&self) -> i64 {
        NodeRow::tree_id(self)
    }

    fn depth(&self) -> u32 {
        NodeRow::depth(self)
    }
}

impl<T: TreePosition> TreePosition for &T {
    fn tree_id(&self) -> i64 {
        (**self).tree_id()
    }

    fn depth(&self) -> u32 {
        (**self).depth()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeEvent<T> {
    Enter(T),
    Leave,
}

/// Turns a `(tree_id, path)`-ordered sequence into enter/leave events.
///
/// An item is a child of the open item right before it when both share a
/// tree and the item is exactly one level deeper. Items without an open
/// parent in the stream (e.g. the first level of a descendants query) become
/// top-level entries. Every `Enter` is matched by exactly one `Leave`.
pub struct TreeEvents<I: Iterator> {
    inner: Fuse<I>,
    held: Option<I::Item>,
    open: Vec<(i64, u32)>,
}

impl<I> TreeEvents<I>
where
    I: Iterator,
    I::Item: TreePosition,
{
    pub fn new(items: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            inner: items.into_iter().fuse(),
            held: None,
            open: Vec::new(),
        }
    }
}

impl<I> Iterator for TreeEvents<I>
where
    I: Iterator,
    I::Item: TreePosition,
{
    type Item = TreeEvent<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.held.is_none() {
            self.held = self.inner.next();
        }
        let Some(item) = self.held.take() else {
            return self.open.pop().map(|_| TreeEvent::Leave);
        };
        if let Some(&(tree_id, depth)) = self.open.last() {
            let is_child = tree_id == item.tree_id() && item.depth() == depth + 1;
            if !is_child {
                self.open.pop();
                self.held = Some(item);
                return Some(TreeEvent::Leave);
            }
        }
        self.open.push((item.tree_id(), item.depth()));
        Some(TreeEvent::Enter(item))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeItem<T> {
    pub node: T,
    pub children: Vec<TreeItem<T>>,
}

/// Collects a path-ordered sequence into an owned forest.
pub fn nest<I>(items: I) -> Vec<TreeItem<I::Item>>
where
    I: IntoIterator,
    I::Item: TreePosition,
{
    let mut roots = Vec::new();
    let mut open: Vec<TreeItem<I::Item>> = Vec::new();
    for event in TreeEvents::new(items) {
        match event {
            TreeEvent::Enter(node) => open.push(TreeItem {
                node,
                children: Vec::new(),
            }),
            TreeEvent::Leave => {
                let Some(done) = open.pop() else {
                    continue;
                };
                match open.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => roots.push(done),
                }
            }
        }
    }
    roots
}
