//! Operator shuffling (§4.2 "Operator shuffling", §6 "Operator shuffling").
//!
//! The parser (`parser.rs`) builds a flat sequence of message nodes with
//! operators as ordinary identifier nodes. This pass renests that flat
//! sequence so each operator's right-hand operand becomes its sole argument,
//! via a standard precedence-climbing algorithm (a Pratt parser over messages
//! instead of tokens). The evaluator (`eval.rs`) never sees unshuffled
//! chains.

use std::sync::Arc;

use ahash::AHashMap;

use crate::message::{MessageChain, MessageNode};

/// Precedence level and associativity for one operator identifier.
#[derive(Debug, Clone, Copy)]
struct OpInfo {
    precedence: u8,
    right_assoc: bool,
}

/// Maps operator text to its precedence/associativity (§6: "a table maps
/// operator identifiers to precedence levels; higher-precedence operators
/// bind tighter").
pub struct OperatorTable {
    ops: AHashMap<&'static str, OpInfo>,
}

impl OperatorTable {
    /// The conventional arithmetic/comparison/logical/bitwise/assignment
    /// groups named in §6, lowest precedence first.
    #[must_use]
    pub fn standard() -> Self {
        let mut ops = AHashMap::default();
        let mut level = |names: &[&'static str], precedence: u8, right_assoc: bool| {
            for name in names {
                ops.insert(*name, OpInfo { precedence, right_assoc });
            }
        };
        level(&[":=", "=", "<-", "<->"], 1, true);
        level(&["||", "or"], 2, false);
        level(&["&&", "and"], 3, false);
        level(&["==", "!=", "<", "<=", ">", ">="], 4, false);
        level(&["|"], 5, false);
        level(&["^"], 6, false);
        level(&["&"], 7, false);
        level(&["<<", ">>"], 8, false);
        level(&["+", "-"], 9, false);
        level(&["*", "/", "%"], 10, false);
        level(&["**"], 11, true);
        Self { ops }
    }

    fn lookup(&self, text: &str) -> Option<OpInfo> {
        self.ops.get(text).copied()
    }

    #[must_use]
    pub fn is_operator(&self, text: &str) -> bool {
        self.ops.contains_key(text)
    }
}

/// Renests a flat node sequence (operators as plain nodes, terminators
/// included) into the evaluator's expected form.
#[must_use]
pub fn shuffle(flat: &[MessageNode], table: &OperatorTable) -> MessageChain {
    let mut pos = 0;
    let mut out = Vec::with_capacity(flat.len());
    while pos < flat.len() {
        if flat[pos].is_terminator() {
            out.push(flat[pos].clone());
            pos += 1;
            continue;
        }
        let run = shuffle_expr(flat, &mut pos, 0, table);
        out.extend(run);
    }
    Arc::from(out)
}

/// Parses one operator-precedence expression starting at `*pos`, consuming
/// up to (but not including) the next terminator or an operator below
/// `min_prec`. Returns the flat output sequence for this expression: a run of
/// atom nodes followed by zero or more operator nodes, each operator's
/// right-hand operand folded into its `args`.
fn shuffle_expr(flat: &[MessageNode], pos: &mut usize, min_prec: u8, table: &OperatorTable) -> Vec<MessageNode> {
    let mut out = Vec::new();
    // An atom run: consecutive non-operator, non-terminator nodes chain
    // left-to-right with no operator-precedence grouping between them --
    // `a foo bar` is just three successive sends, never an operand of
    // anything.
    while *pos < flat.len() && !flat[*pos].is_terminator() && !table.is_operator(&flat[*pos].text) {
        out.push(flat[*pos].clone());
        *pos += 1;
    }
    loop {
        if *pos >= flat.len() || flat[*pos].is_terminator() {
            break;
        }
        let Some(info) = table.lookup(&flat[*pos].text) else { break };
        if info.precedence < min_prec {
            break;
        }
        let op_node_template = flat[*pos].clone();
        *pos += 1;
        let next_min = if info.right_assoc { info.precedence } else { info.precedence + 1 };
        let rhs = shuffle_expr(flat, pos, next_min, table);

        // `:=`/`=`/`<-`/`<->` fold the single bare identifier immediately to
        // their left into a name argument instead of leaving it as a
        // standalone send -- otherwise `a := 1` would look up `a` on the
        // current target before the slot it is about to create exists, and
        // `doesNotRespond` would fire on every first assignment (see
        // DESIGN.md). Anything else to the left (a call, a literal, a
        // multi-node send run) is left alone and falls through to an
        // ordinary operator node.
        if is_assign_op(&op_node_template.text) && out.len() == 1 && out[0].memo.is_none() && out[0].args.is_empty() {
            let name_node = out.pop().unwrap();
            let op_node = MessageNode {
                text: op_node_template.text,
                memo: None,
                args: vec![Arc::from(vec![name_node]), Arc::from(rhs)],
                label: op_node_template.label,
                line: op_node_template.line,
                col: op_node_template.col,
            };
            out.push(op_node);
        } else {
            let op_node = MessageNode {
                text: op_node_template.text,
                memo: None,
                args: vec![Arc::from(rhs)],
                label: op_node_template.label,
                line: op_node_template.line,
                col: op_node_template.col,
            };
            out.push(op_node);
        }
    }
    out
}

fn is_assign_op(text: &str) -> bool {
    matches!(text, ":=" | "=" | "<-" | "<->")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    fn node(text: &str) -> MessageNode {
        MessageNode { text: StdArc::from(text), memo: None, args: vec![], label: StdArc::from("t"), line: 1, col: 1 }
    }

    #[test]
    fn plus_binds_looser_than_times() {
        // "1 + 2 * 3" -> 1 +( 2 *(3) )
        let flat = vec![node("1"), node("+"), node("2"), node("*"), node("3")];
        let table = OperatorTable::standard();
        let chain = shuffle(&flat, &table);
        assert_eq!(chain.len(), 2);
        assert_eq!(&*chain[0].text, "1");
        assert_eq!(&*chain[1].text, "+");
        let rhs = &chain[1].args[0];
        assert_eq!(rhs.len(), 2);
        assert_eq!(&*rhs[0].text, "2");
        assert_eq!(&*rhs[1].text, "*");
        assert_eq!(rhs[1].args[0].len(), 1);
        assert_eq!(&*rhs[1].args[0][0].text, "3");
    }

    #[test]
    fn assignment_folds_bare_identifier_as_name_argument() {
        // "a := b := c" -> :=(name(a), :=(name(b), c)) -- `a`/`b` are never
        // sent as messages, only carried as unevaluated name chains.
        let flat = vec![node("a"), node(":="), node("b"), node(":="), node("c")];
        let chain = shuffle(&flat, &OperatorTable::standard());
        assert_eq!(chain.len(), 1);
        assert_eq!(&*chain[0].text, ":=");
        assert_eq!(chain[0].args.len(), 2);
        assert_eq!(&*chain[0].args[0][0].text, "a");
        let inner = &chain[0].args[1];
        assert_eq!(inner.len(), 1);
        assert_eq!(&*inner[0].text, ":=");
        assert_eq!(&*inner[0].args[0][0].text, "b");
        assert_eq!(&*inner[0].args[1][0].text, "c");
    }

    #[test]
    fn chained_sends_do_not_group() {
        let flat = vec![node("a"), node("foo"), node("bar")];
        let chain = shuffle(&flat, &OperatorTable::standard());
        assert_eq!(chain.len(), 3);
    }
}
