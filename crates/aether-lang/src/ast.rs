use std::rc::Rc;

use smallvec::SmallVec;
use smol_str::SmolStr;

pub mod error;
pub mod node;
pub mod parser;

pub type Program = Vec<Rc<node::Node>>;
pub type IdentName = SmolStr;
pub type Params = SmallVec<[node::Ident; 4]>;
