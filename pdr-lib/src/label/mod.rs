//! Label parsing and the canonical label model.
//!
//! Both PDS3 (ODL/PVL text) and PDS4 (XML) labels are reduced to a [Block]: an ordered
//! multimap of keys to [Value]s where keys may repeat. [Metadata] wraps the tree with the
//! query operations used everywhere else in the crate.
mod block;
mod metadata;
pub mod pds3;
pub mod pds4;
mod value;

pub use block::Block;
pub use metadata::{Identifiers, LabelFormat, Metadata, IDENTIFIER_FIELDS};
pub use value::{Quantity, Value};
