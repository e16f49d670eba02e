#![forbid(unsafe_code)]

//! Reflective (de)serializer for the Havok `TAG0`/`TCM0` binary tagged-object
//! format and its `<hktagfile>` XML textual form.
//!
//! Five operations cover the format end to end:
//!
//! - binary → tree: [`read_tag0`]
//! - tree → XML: [`write_xml`]
//! - XML → tree: [`parse_xml`]
//! - tree → binary: [`write_tag0`]
//! - schema backport: [`backport_2012`]

pub mod error;
pub mod item;
pub mod object;
pub mod primitive;
pub mod reader;
pub mod schema;
pub mod section;
pub mod writer;
pub mod xml;

#[cfg(test)]
mod test;

pub use error::{Error, Result};
pub use object::{Object, ObjectGraph, ObjectId, Value};
pub use reader::{read_tag0, TagFile};
pub use schema::backport::backport_2012;
pub use schema::{Schema, Type, TypeId};
pub use writer::write_tag0;
pub use xml::{parse_xml, write_xml};
