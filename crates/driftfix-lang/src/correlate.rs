//! Bytecode correlation between the tagged and plain compiles.
//!
//! Both compiles run the identical pipeline, so their instruction
//! streams are positionally parallel whenever the source is
//! unambiguous. Instruction comparison looks at opcode, raw argument,
//! and literal constant values, with `Nop` filtered out; nested code
//! constants are paired recursively. When a stream mismatch shows up
//! (the plain pool deduplicated identical nested code objects that the
//! tagged pool kept apart), the affected level maps to `None` and the
//! nested pools are re-partitioned by stream matching. A plain code
//! object with zero or several tagged candidates stays `None`: when
//! the source is ambiguous, resolution must fail rather than guess.

use crate::ast::Module;
use crate::code::{CodeObject, Const, Fingerprint, Instr, Op};
use crate::error::StructureError;
use crate::hooks::RewriteHook;
use crate::index::compile_with_index;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

// ============================================================================
// Instruction Matching
// ============================================================================

fn significant(code: &CodeObject) -> Vec<Instr> {
    code.instrs
        .iter()
        .copied()
        .filter(|i| i.op != Op::Nop)
        .collect()
}

/// Do two code objects run the same instructions? Lines are ignored
/// (they always differ between the compiles); `LoadConst` additionally
/// requires equal literal values, while code-object constants are left
/// to the recursive pairing.
pub fn streams_match(tagged: &CodeObject, plain: &CodeObject) -> bool {
    let a = significant(tagged);
    let b = significant(plain);
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| {
        if x.op != y.op || x.arg != y.arg {
            return false;
        }
        if x.op == Op::LoadConst {
            match (
                tagged.consts.get(x.arg as usize),
                plain.consts.get(y.arg as usize),
            ) {
                (Some(Const::Code(_)), Some(Const::Code(_))) => true,
                (Some(cx), Some(cy)) => cx == cy,
                _ => false,
            }
        } else {
            true
        }
    })
}

// ============================================================================
// Code-Object Pairing
// ============================================================================

/// Pair every code object reachable from `plain` with its tagged
/// counterpart, or `None` where no unique counterpart exists.
pub fn matched_code_pairs(
    tagged: &Rc<CodeObject>,
    plain: &Rc<CodeObject>,
) -> Vec<(Option<Rc<CodeObject>>, Rc<CodeObject>)> {
    let mut out = Vec::new();
    collect(tagged, plain, &mut out);
    out
}

fn collect(
    tagged: &Rc<CodeObject>,
    plain: &Rc<CodeObject>,
    out: &mut Vec<(Option<Rc<CodeObject>>, Rc<CodeObject>)>,
) {
    if streams_match(tagged, plain) {
        out.push((Some(Rc::clone(tagged)), Rc::clone(plain)));
        let tagged_children = tagged.code_consts();
        let plain_children = plain.code_consts();
        if tagged_children.len() == plain_children.len() {
            for (t, p) in tagged_children.iter().zip(plain_children.iter()) {
                collect(t, p, out);
            }
        } else {
            partition(&tagged_children, &plain_children, out);
        }
    } else {
        tracing::debug!(
            code = %plain.name,
            file = %plain.file.display(),
            "instruction streams diverge, partitioning nested code objects"
        );
        out.push((None, Rc::clone(plain)));
        partition(&tagged.code_consts(), &plain.code_consts(), out);
    }
}

/// Re-pair nested pools by stream matching alone. Anything without
/// exactly one candidate maps to `None`.
fn partition(
    tagged_children: &[Rc<CodeObject>],
    plain_children: &[Rc<CodeObject>],
    out: &mut Vec<(Option<Rc<CodeObject>>, Rc<CodeObject>)>,
) {
    for plain in plain_children {
        let mut candidates = tagged_children
            .iter()
            .filter(|t| streams_match(t, plain));
        match (candidates.next(), candidates.next()) {
            (Some(tagged), None) => out.push((Some(Rc::clone(tagged)), Rc::clone(plain))),
            (_, Some(_)) | (None, _) => {
                tracing::debug!(
                    code = %plain.name,
                    file = %plain.file.display(),
                    "no unique tagged counterpart"
                );
                out.push((None, Rc::clone(plain)));
            }
        }
    }
}

// ============================================================================
// File Correlation
// ============================================================================

/// Instruction offset to AST node index, read off the tagged line
/// table. Offsets are shared between the compiles because the
/// peephole pass never re-offsets.
pub fn offset_to_node_index(tagged: &CodeObject) -> HashMap<u32, u32> {
    (0..tagged.instrs.len())
        .filter_map(|offset| {
            tagged
                .line_at(offset)
                .map(|index| (offset as u32, index))
        })
        .collect()
}

/// Everything the resolver needs for one (file, hook) pair: the
/// indexed module and, per plain-code fingerprint, the offset-to-node
/// map, or `None` where correlation failed closed.
pub struct FileCorrelation {
    pub module: Module,
    pub by_fingerprint: HashMap<Fingerprint, Option<HashMap<u32, u32>>>,
}

pub fn correlate_file(
    source: &str,
    file: &Path,
    hook: &dyn RewriteHook,
) -> Result<FileCorrelation, StructureError> {
    let program = compile_with_index(source, file, hook)?;
    let mut by_fingerprint: HashMap<Fingerprint, Option<HashMap<u32, u32>>> = HashMap::new();
    for (tagged, plain) in matched_code_pairs(&program.tagged, &program.plain) {
        let value = tagged.map(|t| offset_to_node_index(&t));
        match by_fingerprint.entry(plain.fingerprint()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => {
                // two distinct code objects with identical instruction
                // streams cannot be told apart at resolve time
                if slot.get() != &value {
                    slot.insert(None);
                }
            }
        }
    }
    Ok(FileCorrelation {
        module: program.module,
        by_fingerprint,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{find_node, ExprKind, Node};
    use crate::hooks::IdentityHook;

    fn correlate(source: &str) -> FileCorrelation {
        correlate_file(source, Path::new("t.dft"), &IdentityHook).expect("correlate")
    }

    #[test]
    fn unambiguous_file_has_no_none_entries() {
        let correlation = correlate(
            "fn area(w, h) {\n  return w * h\n}\nlet sizes = [area(2, 3) for x in range(2)]\nlet f = fn(x) => x + 1\nprint(f(sizes[0]))\n",
        );
        assert!(!correlation.by_fingerprint.is_empty());
        for (_, entry) in &correlation.by_fingerprint {
            assert!(entry.is_some());
        }
    }

    #[test]
    fn identical_lambdas_on_one_line_fail_closed() {
        let correlation = correlate("let fs = [fn(x) => x, fn(x) => x]\n");
        assert!(correlation
            .by_fingerprint
            .values()
            .any(|entry| entry.is_none()));
    }

    #[test]
    fn identical_lambdas_on_separate_lines_resolve() {
        let correlation = correlate("let fs = [fn(x) => x,\n  fn(x) => x]\n");
        for (_, entry) in &correlation.by_fingerprint {
            assert!(entry.is_some());
        }
    }

    #[test]
    fn load_attr_offset_maps_to_attribute_node() {
        let source = "let v = s.value\n";
        let correlation = correlate(source);
        let program =
            compile_with_index(source, Path::new("t.dft"), &IdentityHook).expect("compile");
        let offset = program
            .plain
            .instrs
            .iter()
            .position(|i| i.op == Op::LoadAttr)
            .expect("LoadAttr instr");
        let entry = correlation
            .by_fingerprint
            .get(&program.plain.fingerprint())
            .expect("fingerprint entry")
            .as_ref()
            .expect("unambiguous");
        let index = entry.get(&(offset as u32)).expect("offset mapped");
        let Some(Node::Expr(expr)) = find_node(&correlation.module, *index) else {
            panic!("expected expression node");
        };
        assert!(matches!(&expr.kind, ExprKind::Attribute { attr, .. } if attr == "value"));
    }

    #[test]
    fn every_plain_code_object_has_a_fingerprint_entry() {
        let source = "fn outer() {\n  return fn(x) => x\n}\n";
        let correlation = correlate(source);
        let program =
            compile_with_index(source, Path::new("t.dft"), &IdentityHook).expect("compile");
        let mut stack = vec![Rc::clone(&program.plain)];
        while let Some(code) = stack.pop() {
            assert!(
                correlation
                    .by_fingerprint
                    .contains_key(&code.fingerprint()),
                "missing entry for {}",
                code.name
            );
            stack.extend(code.code_consts());
        }
    }
}
