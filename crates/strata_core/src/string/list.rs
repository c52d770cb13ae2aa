//! # String Lists
//!
//! A singly linked queue of [`Str8`] values whose nodes live in an arena.
//! The list keeps a running node count and byte total so joins can size
//! their output in one push.

use std::cell::Cell;
use std::fmt;

use super::Str8;
use crate::memory::Arena;

/// A list node. Nodes are created in an arena and never move.
pub struct Str8Node<'a> {
    string: Str8<'a>,
    next: Cell<Option<&'a Str8Node<'a>>>,
}

impl<'a> Str8Node<'a> {
    /// An unlinked node holding `string`.
    #[must_use]
    pub const fn new(string: Str8<'a>) -> Self {
        Self {
            string,
            next: Cell::new(None),
        }
    }

    /// The node's string.
    #[inline]
    #[must_use]
    pub const fn string(&self) -> Str8<'a> {
        self.string
    }

    /// The following node, if any.
    #[inline]
    #[must_use]
    pub fn next(&self) -> Option<&'a Str8Node<'a>> {
        self.next.get()
    }
}

impl fmt::Debug for Str8Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Str8Node")
            .field("string", &self.string)
            .field("linked", &self.next.get().is_some())
            .finish()
    }
}

/// A queue of strings with running totals.
#[derive(Default)]
pub struct Str8List<'a> {
    first: Option<&'a Str8Node<'a>>,
    last: Option<&'a Str8Node<'a>>,
    count: usize,
    total_len: usize,
}

impl<'a> Str8List<'a> {
    /// An empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            first: None,
            last: None,
            count: 0,
            total_len: 0,
        }
    }

    /// Number of strings.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Whether the list holds no strings.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Sum of the lengths of every string.
    #[inline]
    #[must_use]
    pub const fn total_len(&self) -> usize {
        self.total_len
    }

    /// The first string.
    #[must_use]
    pub fn first(&self) -> Option<Str8<'a>> {
        self.first.map(Str8Node::string)
    }

    /// The last string.
    #[must_use]
    pub fn last(&self) -> Option<Str8<'a>> {
        self.last.map(Str8Node::string)
    }

    /// Links an existing node at the end of the list.
    ///
    /// # Panics
    ///
    /// Panics if the node is already linked to a successor.
    pub fn append_node(&mut self, node: &'a Str8Node<'a>) {
        assert!(node.next.get().is_none(), "node is already linked into a list");
        match self.last {
            Some(last) => last.next.set(Some(node)),
            None => self.first = Some(node),
        }
        self.last = Some(node);
        self.count += 1;
        self.total_len += node.string.len();
        self.check();
    }

    /// Pushes a node for `string` into `arena` and links it at the end.
    pub fn append(&mut self, arena: &'a Arena, string: Str8<'a>) -> &'a Str8Node<'a> {
        let node: &'a Str8Node<'a> = arena.push_value(Str8Node::new(string));
        self.append_node(node);
        node
    }

    /// Copies the list structure into `arena`. The strings are shared.
    #[must_use]
    pub fn copy_in(&self, arena: &'a Arena) -> Self {
        let mut copy = Self::new();
        for string in self {
            copy.append(arena, string);
        }
        copy
    }

    /// Concatenates the strings with `separator` between them into a new
    /// NUL-terminated string in `arena`.
    #[must_use]
    pub fn join(&self, arena: &'a Arena, separator: Str8<'_>) -> Str8<'a> {
        let len = self.total_len + separator.len() * self.count.saturating_sub(1);
        let buffer: &'a mut [u8] = arena.push_array_aligned::<u8>(len + 1, 1);
        let mut at = 0;
        for (i, string) in self.iter().enumerate() {
            if i > 0 {
                buffer[at..at + separator.len()].copy_from_slice(separator.as_bytes());
                at += separator.len();
            }
            buffer[at..at + string.len()].copy_from_slice(string.as_bytes());
            at += string.len();
        }
        debug_assert_eq!(at, len);
        let buffer: &'a [u8] = buffer;
        Str8::from_bytes(&buffer[..len])
    }

    /// Iterates over the strings in order.
    #[must_use]
    pub fn iter(&self) -> Str8ListIter<'a> {
        Str8ListIter { node: self.first }
    }

    #[inline]
    fn check(&self) {
        debug_assert_eq!(self.first.is_none(), self.count == 0);
        debug_assert_eq!(self.last.is_none(), self.count == 0);
        debug_assert!(self.last.map_or(true, |last| last.next.get().is_none()));
    }
}

impl fmt::Debug for Str8List<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &Str8List<'a> {
    type Item = Str8<'a>;
    type IntoIter = Str8ListIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the strings of a [`Str8List`].
#[derive(Clone)]
pub struct Str8ListIter<'a> {
    node: Option<&'a Str8Node<'a>>,
}

impl<'a> Iterator for Str8ListIter<'a> {
    type Item = Str8<'a>;

    fn next(&mut self) -> Option<Str8<'a>> {
        let node = self.node?;
        self.node = node.next();
        Some(node.string)
    }
}

// ----------------------------------------------------------------------------
// Splitting
// ----------------------------------------------------------------------------
//
// A separator at offset 0 is skipped. Adjacent separators yield an empty
// piece, a trailing separator yields none.

impl<'a> Str8<'a> {
    /// Splits on every complete occurrence of `separator`.
    ///
    /// An empty separator yields the whole string as one piece. A separator
    /// cut short by the end of the input is not a separator: `"a::b:"` split
    /// on `"::"` gives `a` and `b:`, never `a` and `b`.
    ///
    /// ```rust,ignore
    /// let parts = Str8::lit("a::b::::c::").split_by_string(&arena, Str8::lit("::"));
    /// // ["a", "b", "", "c"]
    /// ```
    #[must_use]
    pub fn split_by_string(self, arena: &'a Arena, separator: Str8<'_>) -> Str8List<'a> {
        if separator.is_empty() {
            let mut list = Str8List::new();
            if !self.is_empty() {
                list.append(arena, self);
            }
            return list;
        }
        let bytes = self.bytes;
        self.split_where(arena, |i| {
            bytes[i..].starts_with(separator.bytes).then_some(separator.len())
        })
    }

    /// Splits on any byte in `separators`.
    #[must_use]
    pub fn split_by_chars(self, arena: &'a Arena, separators: &[u8]) -> Str8List<'a> {
        let bytes = self.bytes;
        self.split_where(arena, |i| separators.contains(&bytes[i]).then_some(1))
    }

    /// Splits on `separator`.
    #[must_use]
    pub fn split_by_char(self, arena: &'a Arena, separator: u8) -> Str8List<'a> {
        self.split_by_chars(arena, &[separator])
    }

    /// `separator_at(i)` returns the separator length at offset `i`, if any.
    fn split_where(
        self,
        arena: &'a Arena,
        separator_at: impl Fn(usize) -> Option<usize>,
    ) -> Str8List<'a> {
        let mut list = Str8List::new();
        let mut begin = 0;
        let mut i = 0;
        while i < self.len() {
            match separator_at(i) {
                Some(skip) => {
                    if i > 0 {
                        list.append(arena, self.slice(begin..i));
                    }
                    i += skip;
                    begin = i;
                }
                None => i += 1,
            }
        }
        if begin < self.len() {
            list.append(arena, self.slice(begin..));
        }
        list
    }
}
