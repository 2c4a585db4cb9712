//! XML dump of the parse tree (`--dump`).
//!
//! The format is implementation-defined: a readable rendering of the
//! lowered tree for debugging the front end and inspecting what the code
//! generator will see.

use std::fmt::Write as _;

use crate::ast::{ParseNode, ProgramDef};
use crate::symbol::{SymbolArena, SymbolId};

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn sym_name(arena: &SymbolArena, id: SymbolId) -> String {
    escape(&arena.get(id).name)
}

pub fn dump_xml(program: &ProgramDef) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "<program name=\"{}\" executable=\"{}\">",
        escape(&program.name),
        program.executable
    );

    let _ = writeln!(out, "  <globals>");
    for id in program.globals.ids() {
        let sym = program.arena.get(*id);
        let _ = writeln!(
            out,
            "    <symbol name=\"{}\" class=\"{:?}\" type=\"{}\" width=\"{}\" dims=\"{}\"/>",
            escape(&sym.name),
            sym.class,
            sym.full_type.base.name(),
            sym.full_type.width,
            sym.dims.len()
        );
    }
    let _ = writeln!(out, "  </globals>");

    for proc in &program.procedures {
        let sym = program.arena.get(proc.sym);
        let _ = writeln!(
            out,
            "  <procedure name=\"{}\" class=\"{:?}\" closed=\"{}\" catch=\"{}\">",
            escape(&sym.name),
            sym.class,
            proc.closed,
            proc.catch_exceptions
        );
        for node in &proc.body {
            dump_node(&mut out, &program.arena, node, 2);
        }
        let _ = writeln!(out, "  </procedure>");
    }

    let _ = writeln!(out, "</program>");
    out
}

fn dump_body(out: &mut String, arena: &SymbolArena, tag: &str, body: &[ParseNode], depth: usize) {
    let pad = "  ".repeat(depth);
    let _ = writeln!(out, "{}<{}>", pad, tag);
    for node in body {
        dump_node(out, arena, node, depth + 1);
    }
    let _ = writeln!(out, "{}</{}>", pad, tag);
}

fn dump_node(out: &mut String, arena: &SymbolArena, node: &ParseNode, depth: usize) {
    let pad = "  ".repeat(depth);
    match node {
        ParseNode::Number(v) => {
            let _ = writeln!(out, "{}<number value=\"{}\"/>", pad, v);
        }
        ParseNode::Str(s) => {
            let _ = writeln!(out, "{}<string value=\"{}\"/>", pad, escape(s));
        }
        ParseNode::Identifier {
            sym,
            indexes,
            substring,
        } => {
            if indexes.is_empty() && substring.is_none() {
                let _ = writeln!(out, "{}<identifier name=\"{}\"/>", pad, sym_name(arena, *sym));
            } else {
                let _ = writeln!(out, "{}<identifier name=\"{}\">", pad, sym_name(arena, *sym));
                if !indexes.is_empty() {
                    dump_body(out, arena, "indexes", indexes, depth + 1);
                }
                if let Some(sub) = substring {
                    let _ = writeln!(out, "{}  <substring>", pad);
                    if let Some(start) = &sub.start {
                        dump_node(out, arena, start, depth + 2);
                    }
                    if let Some(end) = &sub.end {
                        dump_node(out, arena, end, depth + 2);
                    }
                    let _ = writeln!(out, "{}  </substring>", pad);
                }
                let _ = writeln!(out, "{}</identifier>", pad);
            }
        }
        ParseNode::Binary { op, ty, left, right } => {
            let _ = writeln!(
                out,
                "{}<binary op=\"{}\" type=\"{}\">",
                pad,
                escape(op.listing()),
                ty.base.name()
            );
            dump_node(out, arena, left, depth + 1);
            dump_node(out, arena, right, depth + 1);
            let _ = writeln!(out, "{}</binary>", pad);
        }
        ParseNode::Unary { op, ty, operand } => {
            let _ = writeln!(
                out,
                "{}<unary op=\"{:?}\" type=\"{}\">",
                pad,
                op,
                ty.base.name()
            );
            dump_node(out, arena, operand, depth + 1);
            let _ = writeln!(out, "{}</unary>", pad);
        }
        ParseNode::Assignment { targets, values } => {
            let _ = writeln!(out, "{}<assignment>", pad);
            dump_body(out, arena, "targets", targets, depth + 1);
            dump_body(out, arena, "values", values, depth + 1);
            let _ = writeln!(out, "{}</assignment>", pad);
        }
        ParseNode::Call { sym, args } => {
            let _ = writeln!(out, "{}<call name=\"{}\">", pad, sym_name(arena, *sym));
            for arg in args {
                dump_node(out, arena, &arg.node, depth + 1);
            }
            let _ = writeln!(out, "{}</call>", pad);
        }
        ParseNode::ExtCall {
            library,
            name,
            args,
            inline,
            ..
        } => {
            let _ = writeln!(
                out,
                "{}<extcall library=\"{}\" name=\"{}\" inline=\"{}\">",
                pad,
                escape(library),
                escape(name),
                inline
            );
            for arg in args {
                dump_node(out, arena, &arg.node, depth + 1);
            }
            let _ = writeln!(out, "{}</extcall>", pad);
        }
        ParseNode::VarArg(items) => dump_body(out, arena, "vararg", items, depth),
        ParseNode::Conditional { branches } => {
            let _ = writeln!(out, "{}<conditional>", pad);
            for branch in branches {
                let _ = writeln!(out, "{}  <branch>", pad);
                if let Some(test) = &branch.test {
                    dump_node(out, arena, test, depth + 2);
                }
                dump_body(out, arena, "body", &branch.body, depth + 2);
                let _ = writeln!(out, "{}  </branch>", pad);
            }
            let _ = writeln!(out, "{}</conditional>", pad);
        }
        ParseNode::Loop {
            kind,
            var,
            start,
            end,
            step,
            break_expr,
            body,
        } => {
            let var_name = var
                .map(|id| sym_name(arena, id))
                .unwrap_or_default();
            let _ = writeln!(out, "{}<loop kind=\"{:?}\" var=\"{}\">", pad, kind, var_name);
            for part in [start, end, step, break_expr].into_iter().flatten() {
                dump_node(out, arena, part, depth + 1);
            }
            dump_body(out, arena, "body", body, depth + 1);
            let _ = writeln!(out, "{}</loop>", pad);
        }
        ParseNode::Break { condition } => match condition {
            Some(cond) => {
                let _ = writeln!(out, "{}<break>", pad);
                dump_node(out, arena, cond, depth + 1);
                let _ = writeln!(out, "{}</break>", pad);
            }
            None => {
                let _ = writeln!(out, "{}<break/>", pad);
            }
        },
        ParseNode::Return(value) => match value {
            Some(value) => {
                let _ = writeln!(out, "{}<return>", pad);
                dump_node(out, arena, value, depth + 1);
                let _ = writeln!(out, "{}</return>", pad);
            }
            None => {
                let _ = writeln!(out, "{}<return/>", pad);
            }
        },
        ParseNode::Goto(sym) => {
            let _ = writeln!(out, "{}<goto label=\"{}\"/>", pad, sym_name(arena, *sym));
        }
        ParseNode::MarkLabel(sym) => {
            let _ = writeln!(out, "{}<label name=\"{}\"/>", pad, sym_name(arena, *sym));
        }
        ParseNode::MarkFilename(path) => {
            let _ = writeln!(out, "{}<file name=\"{}\"/>", pad, escape(&path.display().to_string()));
        }
        ParseNode::MarkLine(n) => {
            let _ = writeln!(out, "{}<line number=\"{}\"/>", pad, n);
        }
        ParseNode::Trappable { body, handler, .. } => {
            let _ = writeln!(out, "{}<trappable>", pad);
            dump_body(out, arena, "body", body, depth + 1);
            dump_body(out, arena, "handler", handler, depth + 1);
            let _ = writeln!(out, "{}</trappable>", pad);
        }
        ParseNode::ReadData { targets, .. } => {
            dump_body(out, arena, "readdata", targets, depth);
        }
        ParseNode::Input {
            prompt, targets, ..
        } => {
            let _ = writeln!(
                out,
                "{}<input prompt=\"{}\">",
                pad,
                escape(prompt.as_deref().unwrap_or(""))
            );
            for target in targets {
                dump_node(out, arena, target, depth + 1);
            }
            let _ = writeln!(out, "{}</input>", pad);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::options::Options;

    #[test]
    fn test_dump_shape() {
        let opts = Options::default();
        let mut diags = Diagnostics::new(4, false);
        let program = crate::compile_text(
            "10 FUNC F\n20 RETURN 1+X\n30 ENDFUNC\n",
            None,
            &opts,
            &mut diags,
        )
        .unwrap();
        let xml = dump_xml(&program);
        assert!(xml.starts_with("<program"));
        assert!(xml.contains("<procedure name=\"F\""));
        assert!(xml.contains("<return>"));
        assert!(xml.trim_end().ends_with("</program>"));
    }

    #[test]
    fn test_escaping() {
        let opts = Options::default();
        let mut diags = Diagnostics::new(4, false);
        let program = crate::compile_text(
            "10 PRINT \"a<b & c\"\n",
            None,
            &opts,
            &mut diags,
        )
        .unwrap();
        let xml = dump_xml(&program);
        assert!(xml.contains("a&lt;b &amp; c"));
    }
}
