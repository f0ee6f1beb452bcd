//! The message chain (§3 "Message", §4.2).
//!
//! The distilled spec describes a chain with explicit `next`/`prev` pointers.
//! Built as real intrusive links that would mean `RefCell<Option<Rc<Message>>>`
//! in both directions -- a shared-mutable cycle the borrow checker fights at
//! every turn, for no benefit once the chain is fixed at parse time (shuffling
//! happens once, before any message in the chain is ever evaluated). Instead a
//! chain is an immutable `Arc<[MessageNode]>` and a "message" as seen from the
//! language (`thisMessage`, `Call message`, `perform`'s `nameOrMsg`) is a cursor
//! -- `(chain, index)` -- with `next`/`prev` computed from the index. Same
//! external contract (walk forward, walk backward, ask "is this a terminator"),
//! no intrusive pointers, no interior mutability, trivially `Send + Sync` for
//! the multi-coroutine evaluator in §4.5.

use std::sync::Arc;

use crate::object::{ObjectRef, Symbol};

/// An immutable, shared message chain. Argument lists are themselves chains.
pub type MessageChain = Arc<[MessageNode]>;

/// One phrase of source: an identifier or literal, its (unevaluated) argument
/// chains, and source location for diagnostics.
#[derive(Debug, Clone)]
pub struct MessageNode {
    /// The slot name to look up, or the textual form of a literal/separator.
    pub text: Symbol,
    /// Precomputed literal result. When present, evaluation uses it directly
    /// with no slot lookup (numbers and strings are the only literals that earn
    /// this; identifiers and operators always have `memo: None`).
    pub memo: Option<ObjectRef>,
    /// Unevaluated argument expressions, each itself a chain.
    pub args: Vec<MessageChain>,
    /// Source file/REPL-line label, for stack traces.
    pub label: Arc<str>,
    pub line: u32,
    pub col: u32,
}

impl MessageNode {
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        &*self.text == ";" || &*self.text == "\n"
    }
}

/// A position within a [`MessageChain`] -- the language-visible notion of "a
/// message" (what `thisMessage` and `Call message` return, what `perform`'s
/// `nameOrMsg` argument can be).
#[derive(Debug, Clone)]
pub struct MessageCursor {
    pub chain: MessageChain,
    pub index: usize,
}

impl MessageCursor {
    #[must_use]
    pub fn new(chain: MessageChain, index: usize) -> Self {
        debug_assert!(index < chain.len(), "message cursor index out of range");
        Self { chain, index }
    }

    /// The head of a chain, as a cursor. Panics on an empty chain -- chains
    /// produced by the parser always have at least one node (an empty program
    /// parses to a single no-op terminator).
    #[must_use]
    pub fn head(chain: MessageChain) -> Self {
        Self::new(chain, 0)
    }

    #[must_use]
    pub fn node(&self) -> &MessageNode {
        &self.chain[self.index]
    }

    #[must_use]
    pub fn text(&self) -> &Symbol {
        &self.node().text
    }

    #[must_use]
    pub fn args(&self) -> &[MessageChain] {
        &self.node().args
    }

    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.node().is_terminator()
    }

    /// The next message in the chain, or `None` at the end.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        (self.index + 1 < self.chain.len()).then(|| Self::new(self.chain.clone(), self.index + 1))
    }

    /// The previous message in the chain, or `None` at the start.
    #[must_use]
    pub fn prev(&self) -> Option<Self> {
        (self.index > 0).then(|| Self::new(self.chain.clone(), self.index - 1))
    }

    /// Argument `i` as its own cursor chain, for evaluating a single argument
    /// lazily (§4.2's `msg.argAt(i).eval(vm, senderLocals)`).
    #[must_use]
    pub fn arg_chain(&self, i: usize) -> Option<MessageChain> {
        self.args().get(i).cloned()
    }

    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.args().len()
    }
}

impl PartialEq for MessageCursor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.chain, &other.chain) && self.index == other.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(text: &str) -> MessageChain {
        Arc::from(vec![MessageNode {
            text: Symbol::from(text),
            memo: None,
            args: vec![],
            label: Arc::from("test"),
            line: 1,
            col: 1,
        }])
    }

    #[test]
    fn cursor_walks_forward_and_back() {
        let chain: MessageChain = Arc::from(vec![
            MessageNode {
                text: Symbol::from("a"),
                memo: None,
                args: vec![],
                label: Arc::from("test"),
                line: 1,
                col: 1,
            },
            MessageNode {
                text: Symbol::from(";"),
                memo: None,
                args: vec![],
                label: Arc::from("test"),
                line: 1,
                col: 2,
            },
            MessageNode {
                text: Symbol::from("b"),
                memo: None,
                args: vec![leaf("1")],
                label: Arc::from("test"),
                line: 2,
                col: 1,
            },
        ]);
        let head = MessageCursor::head(chain);
        assert_eq!(&*head.text().clone(), "a");
        assert!(head.prev().is_none());
        let sep = head.next().unwrap();
        assert!(sep.is_terminator());
        let b = sep.next().unwrap();
        assert_eq!(&*b.text().clone(), "b");
        assert_eq!(b.arg_count(), 1);
        assert!(b.next().is_none());
        assert_eq!(b.prev().unwrap().text(), sep.text());
    }
}
