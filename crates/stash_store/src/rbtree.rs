//! The ordered key index: a concurrent red-black tree of [`SyntheticKey`]s.
//!
//! Nodes live in an arena and point at each other by index, so the usual
//! parent/left/right links never alias. Slots freed by `remove` are recycled
//! through a free list. A single reader/writer lock guards the whole tree:
//! `put` and `remove` take it exclusively, lookups and iteration go through a
//! shared [`IndexSnapshot`] guard.
//!
//! The tree stores keys only; values live in the [`crate::value_map`].

use std::cmp::Ordering;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use crate::key::SyntheticKey;

const NIL: usize = usize::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Clone, Copy)]
struct Node {
    key: SyntheticKey,
    color: Color,
    parent: usize,
    left: usize,
    right: usize,
}

struct Tree {
    nodes: Vec<Node>,
    free: Vec<usize>,
    root: usize,
    len: usize,
}

/// Concurrent ordered index over synthetic keys.
pub struct OrderedIndex {
    inner: RwLock<Tree>,
}

impl OrderedIndex {
    pub fn new() -> Self {
        OrderedIndex {
            inner: RwLock::new(Tree {
                nodes: Vec::new(),
                free: Vec::new(),
                root: NIL,
                len: 0,
            }),
        }
    }

    /// Insert `key` if absent; a duplicate put is a quiet no-op.
    pub fn put(&self, key: SyntheticKey) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key);
    }

    /// Remove `key` if present; an absent remove is a quiet no-op.
    pub fn remove(&self, key: SyntheticKey) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn contains(&self, key: SyntheticKey) -> bool {
        self.snapshot().lookup(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take shared access for lookups and in-order walks. The guard pins the
    /// tree for its lifetime; callers that interleave a walk with mutation
    /// must drop it first (the engine serializes this).
    pub fn snapshot(&self) -> IndexSnapshot<'_> {
        IndexSnapshot {
            tree: self.inner.read().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

impl Default for OrderedIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared-access view of the index.
pub struct IndexSnapshot<'a> {
    tree: RwLockReadGuard<'a, Tree>,
}

/// Handle to a node inside one [`IndexSnapshot`].
#[derive(Clone, Copy)]
pub struct NodeRef(usize);

impl<'a> IndexSnapshot<'a> {
    pub fn lookup(&self, key: SyntheticKey) -> Option<NodeRef> {
        let n = self.tree.lookup(key);
        (n != NIL).then_some(NodeRef(n))
    }

    pub fn key_of(&self, node: NodeRef) -> SyntheticKey {
        self.tree.nodes[node.0].key
    }

    /// In-order iterator positioned on `node`.
    pub fn iter_at(&self, node: NodeRef) -> InOrderIter<'_> {
        InOrderIter {
            tree: &self.tree,
            node: node.0,
            pos: Pos::OnNode,
        }
    }

    /// Iterator positioned before the first key; `next` yields the minimum.
    pub fn iter(&self) -> InOrderIter<'_> {
        InOrderIter {
            tree: &self.tree,
            node: NIL,
            pos: Pos::Begin,
        }
    }

    /// Iterator positioned past the last key; `prev` yields the maximum.
    pub fn iter_back(&self) -> InOrderIter<'_> {
        InOrderIter {
            tree: &self.tree,
            node: NIL,
            pos: Pos::End,
        }
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> Vec<SyntheticKey> {
        let mut out = Vec::with_capacity(self.tree.len);
        let mut it = self.iter();
        while let Some(key) = it.next() {
            out.push(key);
        }
        out
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pos {
    Begin,
    OnNode,
    End,
}

/// Lazy, restartable, bidirectional in-order walk.
///
/// Three positional states: before-first, on a node, past-end. `next` from
/// before-first yields the minimum; `prev` from past-end yields the maximum.
pub struct InOrderIter<'a> {
    tree: &'a Tree,
    node: usize,
    pos: Pos,
}

impl<'a> InOrderIter<'a> {
    /// The key under the cursor, if the cursor is on a node.
    pub fn key(&self) -> Option<SyntheticKey> {
        (self.pos == Pos::OnNode).then(|| self.tree.nodes[self.node].key)
    }

    /// Advance to the next key in ascending order and return it.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<SyntheticKey> {
        match self.pos {
            Pos::End => {
                self.node = NIL;
                None
            }
            Pos::Begin => {
                let min = self.tree.min_node();
                if min == NIL {
                    self.pos = Pos::End;
                    return None;
                }
                self.node = min;
                self.pos = Pos::OnNode;
                self.key()
            }
            Pos::OnNode => {
                let next = self.tree.successor(self.node);
                if next == NIL {
                    self.node = NIL;
                    self.pos = Pos::End;
                    return None;
                }
                self.node = next;
                self.key()
            }
        }
    }

    /// Step back to the previous key in descending order and return it.
    pub fn prev(&mut self) -> Option<SyntheticKey> {
        match self.pos {
            Pos::Begin => {
                self.node = NIL;
                None
            }
            Pos::End => {
                let max = self.tree.max_node();
                if max == NIL {
                    self.pos = Pos::Begin;
                    return None;
                }
                self.node = max;
                self.pos = Pos::OnNode;
                self.key()
            }
            Pos::OnNode => {
                let prev = self.tree.predecessor(self.node);
                if prev == NIL {
                    self.node = NIL;
                    self.pos = Pos::Begin;
                    return None;
                }
                self.node = prev;
                self.key()
            }
        }
    }

    /// Reset the cursor to one-before-first.
    pub fn seek_begin(&mut self) {
        self.node = NIL;
        self.pos = Pos::Begin;
    }

    /// Move the cursor to one-past-the-end.
    pub fn seek_end(&mut self) {
        self.node = NIL;
        self.pos = Pos::End;
    }
}

impl Tree {
    fn alloc(&mut self, key: SyntheticKey, color: Color, parent: usize) -> usize {
        let node = Node {
            key,
            color,
            parent,
            left: NIL,
            right: NIL,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn color(&self, n: usize) -> Color {
        if n == NIL {
            Color::Black
        } else {
            self.nodes[n].color
        }
    }

    fn left(&self, n: usize) -> usize {
        if n == NIL {
            NIL
        } else {
            self.nodes[n].left
        }
    }

    fn right(&self, n: usize) -> usize {
        if n == NIL {
            NIL
        } else {
            self.nodes[n].right
        }
    }

    fn parent(&self, n: usize) -> usize {
        if n == NIL {
            NIL
        } else {
            self.nodes[n].parent
        }
    }

    fn grandparent(&self, n: usize) -> usize {
        self.parent(self.parent(n))
    }

    fn sibling(&self, n: usize) -> usize {
        let p = self.parent(n);
        if p == NIL {
            return NIL;
        }
        if n == self.nodes[p].left {
            self.nodes[p].right
        } else {
            self.nodes[p].left
        }
    }

    fn uncle(&self, n: usize) -> usize {
        self.sibling(self.parent(n))
    }

    fn lookup(&self, key: SyntheticKey) -> usize {
        let mut cur = self.root;
        while cur != NIL {
            match key.cmp(&self.nodes[cur].key) {
                Ordering::Equal => return cur,
                Ordering::Less => cur = self.nodes[cur].left,
                Ordering::Greater => cur = self.nodes[cur].right,
            }
        }
        NIL
    }

    fn min_node(&self) -> usize {
        let mut cur = self.root;
        while self.left(cur) != NIL {
            cur = self.nodes[cur].left;
        }
        cur
    }

    fn max_node(&self) -> usize {
        let mut cur = self.root;
        while self.right(cur) != NIL {
            cur = self.nodes[cur].right;
        }
        cur
    }

    /// Next node in-order: leftmost of the right subtree, or the first
    /// ancestor whose left subtree contains `n`.
    fn successor(&self, n: usize) -> usize {
        if self.nodes[n].right != NIL {
            let mut cur = self.nodes[n].right;
            while self.nodes[cur].left != NIL {
                cur = self.nodes[cur].left;
            }
            return cur;
        }
        let mut cur = n;
        let mut p = self.nodes[cur].parent;
        while p != NIL {
            if cur == self.nodes[p].left {
                return p;
            }
            cur = p;
            p = self.nodes[cur].parent;
        }
        NIL
    }

    fn predecessor(&self, n: usize) -> usize {
        if self.nodes[n].left != NIL {
            let mut cur = self.nodes[n].left;
            while self.nodes[cur].right != NIL {
                cur = self.nodes[cur].right;
            }
            return cur;
        }
        let mut cur = n;
        let mut p = self.nodes[cur].parent;
        while p != NIL {
            if cur == self.nodes[p].right {
                return p;
            }
            cur = p;
            p = self.nodes[cur].parent;
        }
        NIL
    }

    fn put(&mut self, key: SyntheticKey) {
        if self.root == NIL {
            self.root = self.alloc(key, Color::Black, NIL);
            self.len = 1;
            return;
        }
        let mut cur = self.root;
        loop {
            match key.cmp(&self.nodes[cur].key) {
                Ordering::Equal => return,
                Ordering::Less => {
                    if self.nodes[cur].left == NIL {
                        let n = self.alloc(key, Color::Red, cur);
                        self.nodes[cur].left = n;
                        self.insert_case1(n);
                        self.len += 1;
                        return;
                    }
                    cur = self.nodes[cur].left;
                }
                Ordering::Greater => {
                    if self.nodes[cur].right == NIL {
                        let n = self.alloc(key, Color::Red, cur);
                        self.nodes[cur].right = n;
                        self.insert_case1(n);
                        self.len += 1;
                        return;
                    }
                    cur = self.nodes[cur].right;
                }
            }
        }
    }

    fn remove(&mut self, key: SyntheticKey) {
        let mut del = self.lookup(key);
        if del == NIL {
            return;
        }

        if self.nodes[del].left != NIL && self.nodes[del].right != NIL {
            // Interior node: swap in the in-order predecessor's key and
            // unlink that node instead.
            let mut repl = self.nodes[del].left;
            while self.nodes[repl].right != NIL {
                repl = self.nodes[repl].right;
            }
            self.nodes[del].key = self.nodes[repl].key;
            del = repl;
        }

        let child = if self.nodes[del].right == NIL {
            self.nodes[del].left
        } else {
            self.nodes[del].right
        };
        if self.nodes[del].color == Color::Black {
            self.nodes[del].color = self.color(child);
            self.delete_case1(del);
        }
        self.replace_node(del, child);
        if self.nodes[del].parent == NIL && child != NIL {
            self.nodes[child].color = Color::Black;
        }

        self.free.push(del);
        self.len -= 1;
    }

    fn replace_node(&mut self, old: usize, new: usize) {
        let p = self.nodes[old].parent;
        if p == NIL {
            self.root = new;
        } else if old == self.nodes[p].left {
            self.nodes[p].left = new;
        } else {
            self.nodes[p].right = new;
        }
        if new != NIL {
            self.nodes[new].parent = p;
        }
    }

    fn rotate_left(&mut self, n: usize) {
        let r = self.nodes[n].right;
        self.replace_node(n, r);
        let rl = self.nodes[r].left;
        self.nodes[n].right = rl;
        if rl != NIL {
            self.nodes[rl].parent = n;
        }
        self.nodes[r].left = n;
        self.nodes[n].parent = r;
    }

    fn rotate_right(&mut self, n: usize) {
        let l = self.nodes[n].left;
        self.replace_node(n, l);
        let lr = self.nodes[l].right;
        self.nodes[n].left = lr;
        if lr != NIL {
            self.nodes[lr].parent = n;
        }
        self.nodes[l].right = n;
        self.nodes[n].parent = l;
    }

    fn insert_case1(&mut self, n: usize) {
        if self.nodes[n].parent == NIL {
            self.nodes[n].color = Color::Black;
        } else {
            self.insert_case2(n);
        }
    }

    fn insert_case2(&mut self, n: usize) {
        if self.color(self.nodes[n].parent) == Color::Black {
            return;
        }
        self.insert_case3(n);
    }

    fn insert_case3(&mut self, n: usize) {
        let uncle = self.uncle(n);
        if self.color(uncle) == Color::Red {
            let p = self.nodes[n].parent;
            self.nodes[p].color = Color::Black;
            self.nodes[uncle].color = Color::Black;
            let g = self.grandparent(n);
            self.nodes[g].color = Color::Red;
            self.insert_case1(g);
        } else {
            self.insert_case4(n);
        }
    }

    fn insert_case4(&mut self, n: usize) {
        let mut n = n;
        let g = self.grandparent(n);
        let p = self.nodes[n].parent;
        if n == self.nodes[p].right && p == self.nodes[g].left {
            self.rotate_left(p);
            n = self.nodes[n].left;
        } else if n == self.nodes[p].left && p == self.nodes[g].right {
            self.rotate_right(p);
            n = self.nodes[n].right;
        }
        self.insert_case5(n);
    }

    fn insert_case5(&mut self, n: usize) {
        let p = self.nodes[n].parent;
        self.nodes[p].color = Color::Black;
        let g = self.grandparent(n);
        self.nodes[g].color = Color::Red;
        if n == self.nodes[p].left && p == self.nodes[g].left {
            self.rotate_right(g);
        } else if n == self.nodes[p].right && p == self.nodes[g].right {
            self.rotate_left(g);
        }
    }

    fn delete_case1(&mut self, n: usize) {
        if self.nodes[n].parent == NIL {
            return;
        }
        self.delete_case2(n);
    }

    fn delete_case2(&mut self, n: usize) {
        let sib = self.sibling(n);
        if self.color(sib) == Color::Red {
            let p = self.nodes[n].parent;
            self.nodes[p].color = Color::Red;
            self.nodes[sib].color = Color::Black;
            if n == self.nodes[p].left {
                self.rotate_left(p);
            } else {
                self.rotate_right(p);
            }
        }
        self.delete_case3(n);
    }

    fn delete_case3(&mut self, n: usize) {
        let sib = self.sibling(n);
        if self.color(self.nodes[n].parent) == Color::Black
            && self.color(sib) == Color::Black
            && self.color(self.left(sib)) == Color::Black
            && self.color(self.right(sib)) == Color::Black
        {
            self.nodes[sib].color = Color::Red;
            let p = self.nodes[n].parent;
            self.delete_case1(p);
        } else {
            self.delete_case4(n);
        }
    }

    fn delete_case4(&mut self, n: usize) {
        let sib = self.sibling(n);
        if self.color(self.nodes[n].parent) == Color::Red
            && self.color(sib) == Color::Black
            && self.color(self.left(sib)) == Color::Black
            && self.color(self.right(sib)) == Color::Black
        {
            self.nodes[sib].color = Color::Red;
            let p = self.nodes[n].parent;
            self.nodes[p].color = Color::Black;
        } else {
            self.delete_case5(n);
        }
    }

    fn delete_case5(&mut self, n: usize) {
        let sib = self.sibling(n);
        let p = self.nodes[n].parent;
        if n == self.left(p)
            && self.color(sib) == Color::Black
            && self.color(self.left(sib)) == Color::Red
            && self.color(self.right(sib)) == Color::Black
        {
            self.nodes[sib].color = Color::Red;
            let sl = self.nodes[sib].left;
            self.nodes[sl].color = Color::Black;
            self.rotate_right(sib);
        } else if n == self.right(p)
            && self.color(sib) == Color::Black
            && self.color(self.right(sib)) == Color::Red
            && self.color(self.left(sib)) == Color::Black
        {
            self.nodes[sib].color = Color::Red;
            let sr = self.nodes[sib].right;
            self.nodes[sr].color = Color::Black;
            self.rotate_left(sib);
        }
        self.delete_case6(n);
    }

    fn delete_case6(&mut self, n: usize) {
        let sib = self.sibling(n);
        let p = self.nodes[n].parent;
        self.nodes[sib].color = self.color(p);
        self.nodes[p].color = Color::Black;
        if n == self.nodes[p].left && self.color(self.right(sib)) == Color::Red {
            let sr = self.nodes[sib].right;
            self.nodes[sr].color = Color::Black;
            self.rotate_left(p);
        } else if self.color(self.left(sib)) == Color::Red {
            let sl = self.nodes[sib].left;
            self.nodes[sl].color = Color::Black;
            self.rotate_right(p);
        }
    }
}
