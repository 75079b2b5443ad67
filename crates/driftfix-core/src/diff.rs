//! Unified diff generation.
//!
//! Produces standard unified diff output (3 context lines, `@@` hunk
//! headers) from an old/new text pair. Used for the non-destructive
//! patch output mode, where the rewriter's result is emitted as a
//! `.patch` file instead of being written in place.

// ============================================================================
// Line-level Opcodes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Replace,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy)]
struct DiffOp {
    tag: Tag,
    i1: usize,
    i2: usize,
    j1: usize,
    j2: usize,
}

/// Compute line-level opcodes via LCS backtracking.
fn diff_ops(old: &[&str], new: &[&str]) -> Vec<DiffOp> {
    let n = old.len();
    let m = new.len();
    // dp[i][j] = LCS length of old[i..] and new[j..]
    let mut dp = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if old[i] == new[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }

    // Backtrack, coalescing maximal runs of matched / unmatched lines.
    let mut ops: Vec<DiffOp> = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        let (i1, j1) = (i, j);
        if i < n && j < m && old[i] == new[j] {
            while i < n && j < m && old[i] == new[j] {
                i += 1;
                j += 1;
            }
            ops.push(DiffOp {
                tag: Tag::Equal,
                i1,
                i2: i,
                j1,
                j2: j,
            });
        } else {
            while i < n || j < m {
                if i < n && j < m && old[i] == new[j] {
                    break;
                }
                if i < n && (j >= m || dp[i + 1][j] >= dp[i][j + 1]) {
                    i += 1;
                } else {
                    j += 1;
                }
            }
            let tag = match (i > i1, j > j1) {
                (true, true) => Tag::Replace,
                (true, false) => Tag::Delete,
                _ => Tag::Insert,
            };
            ops.push(DiffOp {
                tag,
                i1,
                i2: i,
                j1,
                j2: j,
            });
        }
    }
    ops
}

// ============================================================================
// Hunk Grouping and Rendering
// ============================================================================

fn format_range(start: usize, count: usize) -> String {
    // Unified format: a zero-count range reports the line *before*.
    let display_start = if count == 0 { start } else { start + 1 };
    if count == 1 {
        format!("{}", display_start)
    } else {
        format!("{},{}", display_start, count)
    }
}

fn push_line(out: &mut String, prefix: char, line: &str) {
    out.push(prefix);
    out.push_str(line);
    if !line.ends_with('\n') {
        out.push_str("\n\\ No newline at end of file\n");
    }
}

/// Generate a unified diff between `old` and `new`.
///
/// Returns an empty string when the texts are identical. `from` and
/// `to` become the `---` / `+++` header paths.
pub fn unified_diff(old: &str, new: &str, from: &str, to: &str) -> String {
    const CONTEXT: usize = 3;

    if old == new {
        return String::new();
    }

    let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
    let new_lines: Vec<&str> = new.split_inclusive('\n').collect();
    let ops = diff_ops(&old_lines, &new_lines);

    // Trim leading/trailing context and split groups separated by more
    // than 2 * CONTEXT equal lines into separate hunks.
    let mut groups: Vec<Vec<DiffOp>> = Vec::new();
    let mut current: Vec<DiffOp> = Vec::new();
    for (k, op) in ops.iter().enumerate() {
        let mut op = *op;
        if op.tag == Tag::Equal {
            let len = op.i2 - op.i1;
            if k == 0 {
                // leading context
                op.i1 = op.i2.saturating_sub(CONTEXT.min(len));
                op.j1 = op.j2.saturating_sub(CONTEXT.min(len));
            } else if k == ops.len() - 1 {
                // trailing context
                op.i2 = op.i1 + CONTEXT.min(len);
                op.j2 = op.j1 + CONTEXT.min(len);
            } else if len > 2 * CONTEXT {
                // split: close current group, start a new one
                let mut head = op;
                head.i2 = head.i1 + CONTEXT;
                head.j2 = head.j1 + CONTEXT;
                current.push(head);
                groups.push(std::mem::take(&mut current));
                let mut tail = op;
                tail.i1 = tail.i2 - CONTEXT;
                tail.j1 = tail.j2 - CONTEXT;
                current.push(tail);
                continue;
            }
        }
        current.push(op);
    }
    if current.iter().any(|op| op.tag != Tag::Equal) {
        groups.push(current);
    }

    let mut out = String::new();
    out.push_str(&format!("--- {}\n", from));
    out.push_str(&format!("+++ {}\n", to));

    for group in &groups {
        let first = group.first().expect("group is never empty");
        let last = group.last().expect("group is never empty");
        let old_count = last.i2 - first.i1;
        let new_count = last.j2 - first.j1;
        out.push_str(&format!(
            "@@ -{} +{} @@\n",
            format_range(first.i1, old_count),
            format_range(first.j1, new_count),
        ));
        for op in group {
            match op.tag {
                Tag::Equal => {
                    for line in &old_lines[op.i1..op.i2] {
                        push_line(&mut out, ' ', line);
                    }
                }
                Tag::Replace | Tag::Delete => {
                    for line in &old_lines[op.i1..op.i2] {
                        push_line(&mut out, '-', line);
                    }
                    if op.tag == Tag::Replace {
                        for line in &new_lines[op.j1..op.j2] {
                            push_line(&mut out, '+', line);
                        }
                    }
                }
                Tag::Insert => {
                    for line in &new_lines[op.j1..op.j2] {
                        push_line(&mut out, '+', line);
                    }
                }
            }
        }
    }

    out
}

// ============================================================================
// Tests
// ============================================================================
