mod dfa;
mod dom_tree;
mod liveness_dfa;
mod loops;

pub use dfa::DFA;
pub use dom_tree::{compute_dominator_sets, compute_unreachable_blocks, DomTree};
pub use liveness_dfa::LivenessDFA;
pub use loops::{find_loops, Loop};
