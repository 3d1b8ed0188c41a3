//! Red-black tree of free blocks, keyed on usable size
//!
//! The tree nodes live inside the free blocks themselves; the tree owns no
//! memory. Keys are not unique in general, but the tree keeps them unique
//! structurally: the first free block of a given size becomes the tree
//! node, later same-size blocks hang off it in a doubly linked *duplicate
//! chain* so lookups stay `O(log n)` in the number of distinct sizes and
//! chain removal stays `O(1)`.
//!
//! ## Duplicate chain encoding
//!
//! Chain members reuse the tree node fields:
//! - `duplist == self` tags a block as a chain member; a tree node's
//!   `duplist` is null or points at its chain head
//! - `children[0]` is the previous chain element; for the chain head that
//!   is the in-tree node itself (recognizable by `duplist != self`)
//! - `children[1]` is the next chain element, null at the tail
//!
//! ## Deletion placeholder
//!
//! Removing a childless black node leaves a double-black hole; a transient
//! placeholder node on the caller's stack stands in for it while the six
//! standard rebalancing cases run, and is unlinked before returning.

use core::ptr;

use super::block::FreeBlock;

pub(super) const LEFT: usize = 0;
pub(super) const RIGHT: usize = 1;

/// Null-tolerant color probe: missing children count as black.
#[inline]
unsafe fn is_red(node: *mut FreeBlock) -> bool {
    !node.is_null() && unsafe { (*node).is_red() }
}

/// Free-block tree rooted somewhere inside the heap buffer
pub(super) struct FreeTree {
    pub(super) root: *mut FreeBlock,
}

impl FreeTree {
    pub(super) const fn empty() -> Self {
        FreeTree {
            root: ptr::null_mut(),
        }
    }

    /// Finds the smallest free block whose usable size is at least `need`
    ///
    /// Descends from the root tracking the tightest candidate: left when
    /// the current node suffices, right when it does not, short-circuiting
    /// on an exact match. Null when nothing fits.
    pub(super) unsafe fn best_fit(&self, need: usize) -> *mut FreeBlock {
        unsafe {
            let mut it = self.root;
            let mut best = ptr::null_mut();
            while !it.is_null() {
                let space = (*it).space();
                if space == need {
                    return it;
                } else if space > need {
                    best = it;
                    it = (*it).children[LEFT];
                } else {
                    it = (*it).children[RIGHT];
                }
            }
            best
        }
    }

    /// Inserts a free block, rewriting all of its node fields
    ///
    /// An incoming block whose key already exists in the tree is spliced
    /// in as the new head of that node's duplicate chain instead of
    /// becoming a second tree node.
    pub(super) unsafe fn insert(&mut self, f: *mut FreeBlock) {
        unsafe {
            if self.root.is_null() {
                (*f).children = [ptr::null_mut(); 2];
                (*f).parent = ptr::null_mut();
                (*f).duplist = ptr::null_mut();
                (*f).set_black();
                self.root = f;
                return;
            }

            let space = (*f).space();
            let mut it = self.root;
            loop {
                let it_space = (*it).space();
                if space == it_space {
                    self.push_duplicate(it, f);
                    return;
                }
                let d = if space < it_space { LEFT } else { RIGHT };
                if (*it).children[d].is_null() {
                    (*it).children[d] = f;
                    break;
                }
                it = (*it).children[d];
            }

            (*f).parent = it;
            (*f).children = [ptr::null_mut(); 2];
            (*f).duplist = ptr::null_mut();
            (*f).set_red();
            self.repair_insert(f);
        }
    }

    /// Removes a free block, wherever it currently lives
    ///
    /// Chain members unlink in `O(1)`; a tree node with a chain promotes
    /// its chain head instead of rebalancing; a lone tree node goes
    /// through full red-black deletion.
    pub(super) unsafe fn remove(&mut self, f: *mut FreeBlock) {
        unsafe {
            if (*f).duplist == f {
                self.unlink_duplicate(f);
            } else if !(*f).duplist.is_null() {
                self.promote_duplicate(f);
            } else {
                self.remove_node(f);
            }
        }
    }

    /// Splices `f` in as the new chain head of tree node `node`.
    unsafe fn push_duplicate(&mut self, node: *mut FreeBlock, f: *mut FreeBlock) {
        unsafe {
            let old_head = (*node).duplist;
            (*f).duplist = f;
            (*f).children[0] = node;
            (*f).children[1] = old_head;
            (*f).parent = ptr::null_mut();
            if !old_head.is_null() {
                (*old_head).children[0] = f;
            }
            (*node).duplist = f;
            debug_assert!(self.chain_encoding_ok(node));
        }
    }

    /// Unlinks a chain member (`duplist == self`) from its chain.
    unsafe fn unlink_duplicate(&mut self, f: *mut FreeBlock) {
        unsafe {
            let prev = (*f).children[0];
            let next = (*f).children[1];
            if (*prev).duplist == prev {
                // Predecessor is another chain member.
                (*prev).children[1] = next;
            } else {
                // Predecessor is the owning tree node; f was the head.
                debug_assert!((*prev).duplist == f);
                (*prev).duplist = next;
            }
            if !next.is_null() {
                (*next).children[0] = prev;
            }
        }
    }

    /// Replaces tree node `f` by its chain head, inheriting parent,
    /// children, color and the rest of the chain. No rebalance needed:
    /// the tree shape is untouched.
    unsafe fn promote_duplicate(&mut self, f: *mut FreeBlock) {
        unsafe {
            let c = (*f).duplist;
            debug_assert!((*c).duplist == c && (*c).children[0] == f);
            let rest = (*c).children[1];

            // The promoted node becomes the tree-side chain owner.
            (*c).duplist = rest;
            if !rest.is_null() {
                (*rest).children[0] = c;
            }

            (*c).children = (*f).children;
            (*c).parent = (*f).parent;
            (*c).set_color_of(&*f);

            if !(*c).children[LEFT].is_null() {
                (*(*c).children[LEFT]).parent = c;
            }
            if !(*c).children[RIGHT].is_null() {
                (*(*c).children[RIGHT]).parent = c;
            }
            let p = (*c).parent;
            if p.is_null() {
                self.root = c;
            } else if (*p).children[LEFT] == f {
                (*p).children[LEFT] = c;
            } else {
                (*p).children[RIGHT] = c;
            }
            debug_assert!(self.chain_encoding_ok(c));
        }
    }

    /// Full red-black deletion of a chainless tree node.
    unsafe fn remove_node(&mut self, f: *mut FreeBlock) {
        unsafe {
            let lc = (*f).children[LEFT];
            let rc = (*f).children[RIGHT];

            if f == self.root && lc.is_null() && rc.is_null() {
                self.root = ptr::null_mut();
                return;
            }

            let mut placeholder = FreeBlock::placeholder();
            let ph: *mut FreeBlock = &mut placeholder;
            let db: *mut FreeBlock;

            match (!lc.is_null(), !rc.is_null()) {
                // No children: a red leaf just unlinks, a black one leaves
                // the placeholder behind as the double-black.
                (false, false) => {
                    let p = (*f).parent;
                    if (*f).is_red() {
                        if !p.is_null() {
                            let d = if f == (*p).children[LEFT] { LEFT } else { RIGHT };
                            (*p).children[d] = ptr::null_mut();
                        }
                        return;
                    }
                    db = ph;
                    (*ph).parent = p;
                    if !p.is_null() {
                        let d = if f == (*p).children[LEFT] { LEFT } else { RIGHT };
                        (*p).children[d] = ph;
                    }
                }
                // One child: splice the child up; if either node was red
                // the child repaints black and the tree is already valid.
                (false, true) | (true, false) => {
                    let c = if lc.is_null() { rc } else { lc };
                    let red = (*f).is_red() || (*c).is_red();

                    db = c;
                    (*c).set_black();
                    (*c).parent = (*f).parent;
                    let p = (*f).parent;
                    if !p.is_null() {
                        let d = if f == (*p).children[LEFT] { LEFT } else { RIGHT };
                        (*p).children[d] = c;
                    } else {
                        self.root = c;
                    }
                    if red {
                        return;
                    }
                }
                // Two children: swap positions (not keys) with the
                // in-order successor, then the node to remove has at most
                // one child.
                (true, true) => {
                    let mut it = rc;
                    while !(*it).children[LEFT].is_null() {
                        it = (*it).children[LEFT];
                    }
                    let red_succ = (*it).is_red();
                    let succ_parent = (*it).parent;
                    let succ_right = (*it).children[RIGHT];

                    (*it).set_color_of(&*f);
                    (*it).parent = (*f).parent;
                    let p = (*f).parent;
                    if !p.is_null() {
                        let d = if f == (*p).children[LEFT] { LEFT } else { RIGHT };
                        (*p).children[d] = it;
                    } else {
                        self.root = it;
                    }

                    (*lc).parent = it;
                    (*it).children[LEFT] = lc;

                    if rc == it {
                        // Successor was f's own right child.
                        if red_succ {
                            return;
                        }
                        if !(*it).children[RIGHT].is_null() {
                            db = (*it).children[RIGHT];
                            if (*db).is_red() {
                                (*db).set_black();
                                return;
                            }
                        } else {
                            db = ph;
                            (*ph).parent = it;
                            (*it).children[RIGHT] = ph;
                        }
                    } else {
                        (*rc).parent = it;
                        (*it).children[RIGHT] = rc;

                        if !succ_right.is_null() {
                            (*succ_right).parent = succ_parent;
                            (*succ_parent).children[LEFT] = succ_right;
                            if red_succ {
                                return;
                            }
                            db = succ_right;
                            if (*db).is_red() {
                                (*db).set_black();
                                return;
                            }
                        } else if red_succ {
                            (*succ_parent).children[LEFT] = ptr::null_mut();
                            return;
                        } else {
                            db = ph;
                            (*ph).parent = succ_parent;
                            (*succ_parent).children[LEFT] = ph;
                        }
                    }
                }
            }

            self.repair_remove(db);

            // Unlink the placeholder if rebalancing left it in the tree.
            let pp = (*ph).parent;
            if !pp.is_null() {
                if (*pp).children[LEFT] == ph {
                    (*pp).children[LEFT] = ptr::null_mut();
                } else if (*pp).children[RIGHT] == ph {
                    (*pp).children[RIGHT] = ptr::null_mut();
                }
            }
        }
    }

    /// Standard insert repair: recolor past a red uncle, straighten a
    /// zig-zag, terminal rotate at the grandparent.
    unsafe fn repair_insert(&mut self, mut f: *mut FreeBlock) {
        unsafe {
            loop {
                let p = (*f).parent;
                if p.is_null() {
                    (*f).set_black();
                    return;
                }
                if !(*p).is_red() {
                    return;
                }

                let gp = (*p).parent;
                let pd = if p == (*gp).children[LEFT] { LEFT } else { RIGHT };
                let uncle = (*gp).children[1 - pd];

                if is_red(uncle) {
                    (*p).set_black();
                    (*uncle).set_black();
                    (*gp).set_red();
                    f = gp;
                    continue;
                }

                if f == (*p).children[RIGHT] && p == (*gp).children[LEFT] {
                    self.rotate(p, LEFT);
                    f = p;
                } else if f == (*p).children[LEFT] && p == (*gp).children[RIGHT] {
                    self.rotate(p, RIGHT);
                    f = p;
                }

                let p = (*f).parent;
                let gp = (*p).parent;
                if f == (*p).children[LEFT] {
                    self.rotate(gp, RIGHT);
                } else {
                    self.rotate(gp, LEFT);
                }
                (*p).set_black();
                (*gp).set_red();
                return;
            }
        }
    }

    /// The six double-black cases, bubbling `u` up until resolved.
    unsafe fn repair_remove(&mut self, mut u: *mut FreeBlock) {
        unsafe {
            loop {
                let p = (*u).parent;
                if p.is_null() {
                    // Double-black reached the root; black height shrank
                    // uniformly.
                    return;
                }

                let ud = if u == (*p).children[RIGHT] { RIGHT } else { LEFT };
                let mut s = (*p).children[1 - ud];

                // Red sibling: rotate it up so the remaining cases see a
                // black sibling.
                if (*s).is_red() {
                    (*p).set_red();
                    (*s).set_black();
                    self.rotate(p, ud);
                    s = (*p).children[1 - ud];
                }

                let near_red = is_red((*s).children[ud]);
                let far_red = is_red((*s).children[1 - ud]);

                if !(*p).is_red() && !(*s).is_red() && !near_red && !far_red {
                    // Recolor and bubble the double-black upward.
                    (*s).set_red();
                    u = p;
                    continue;
                }
                if (*p).is_red() && !(*s).is_red() && !near_red && !far_red {
                    (*s).set_red();
                    (*p).set_black();
                    return;
                }
                if !(*s).is_red() && near_red && !far_red {
                    // Align the red child with the rotation direction.
                    (*s).set_red();
                    (*(*s).children[ud]).set_black();
                    self.rotate(s, 1 - ud);
                    s = (*s).parent;
                }

                // Terminal rotation: sibling takes the parent's color, the
                // far child and parent go black.
                (*s).set_color_of(&*p);
                (*p).set_black();
                (*(*s).children[1 - ud]).set_black();
                self.rotate(p, ud);
                return;
            }
        }
    }

    /// Rotation in direction `d`: the child opposite `d` becomes the new
    /// subtree root.
    unsafe fn rotate(&mut self, f: *mut FreeBlock, d: usize) {
        unsafe {
            let c = (*f).children[1 - d];
            let p = (*f).parent;

            if !p.is_null() {
                let slot = if (*p).children[LEFT] == f { LEFT } else { RIGHT };
                (*p).children[slot] = c;
            } else {
                self.root = c;
            }
            (*c).parent = p;

            (*f).children[1 - d] = (*c).children[d];
            if !(*c).children[d].is_null() {
                (*(*c).children[d]).parent = f;
            }

            (*f).parent = c;
            (*c).children[d] = f;
        }
    }

    /// Validates the duplicate-chain encoding hanging off `node`; used in
    /// debug assertions after every chain mutation.
    unsafe fn chain_encoding_ok(&self, node: *mut FreeBlock) -> bool {
        unsafe {
            if (*node).duplist == node {
                return false;
            }
            let mut prev = node;
            let mut cur = (*node).duplist;
            while !cur.is_null() {
                if (*cur).duplist != cur {
                    return false;
                }
                if (*cur).children[0] != prev {
                    return false;
                }
                if (*cur).space() != (*node).space() {
                    return false;
                }
                prev = cur;
                cur = (*cur).children[1];
            }
            true
        }
    }
}
