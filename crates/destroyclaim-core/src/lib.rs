//! Destroyclaim Core - Claim types, condition expressions, reference graph, errors

pub mod error;
pub mod logic;
pub mod refs;
pub mod types;

pub use error::{Error, Result};
pub use logic::{Bindings, CompareOp, Expr};
pub use refs::{
    condition_graph, detect_cycles, find_cycles, flat_index, id_universe, referenced_ids,
    IdSelector, IndexedElement,
};
pub use types::*;
