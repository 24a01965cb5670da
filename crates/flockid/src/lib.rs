#![doc = include_str!("../README.md")]

mod error;
mod fingerprint;
mod generator;
mod layout;
mod node;
mod protocol;
mod registry;
mod store;
mod time;

pub use crate::error::*;
pub use crate::fingerprint::*;
pub use crate::generator::*;
pub use crate::layout::*;
pub use crate::node::*;
pub use crate::protocol::*;
pub use crate::registry::*;
pub use crate::store::*;
pub use crate::time::*;
