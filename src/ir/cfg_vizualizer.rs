use graphviz_rust::{
    dot_generator::*,
    dot_structures::*,
    printer::{DotPrinter, PrinterContext},
};

use super::cfg::Cfg;
use super::func_printer::tac_to_string;
use super::tac::Tac;

fn block_label(cfg: &Cfg, code: &[Tac], block_id: usize) -> String {
    let mut label = format!("b{block_id}\\l");

    for instr in cfg[block_id].instrs(code).iter() {
        label.push_str(&tac_to_string(instr).replace('\\', "\\\\").replace('"', "\\\""));
        label.push_str("\\l");
    }

    label
}

/// Renders the control flow graph of `code` as a DOT digraph, one box per
/// basic block listing its instructions.
pub fn cfg_to_dot(name: &str, code: &[Tac]) -> String {
    let cfg = Cfg::new(code);
    let mut g = graph!(strict di id!(name));

    for block in cfg.get_blocks().iter() {
        let id = format!("b{}", block.get_id());
        let label = block_label(&cfg, code, block.get_id());

        g.add_stmt(stmt!(node!(id; attr!("shape", "box"), attr!("label", esc label))));

        for successor in block.get_successors().iter() {
            let successor = format!("b{successor}");

            g.add_stmt(stmt!(edge!(node_id!(id) => node_id!(successor))));
        }
    }

    g.print(&mut PrinterContext::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Operand, Type};

    #[test]
    fn dot_lists_blocks_and_edges() {
        let code = vec![
            Tac::cond_jump(Operand::temp(0, Type::Boolean), "end"),
            Tac::assign(Operand::temp(1, Type::String), Operand::string("hi")),
            Tac::label("end"),
        ];
        let dot = cfg_to_dot("unit", &code);

        assert!(dot.contains("digraph"));
        assert!(dot.contains("b0 -> b1"));
        assert!(dot.contains("b0 -> b2"));
        assert!(dot.contains("b1 -> b2"));
        assert!(dot.contains("\\\"hi\\\""));
    }
}
