//! On-disk layout of the container, one module per structure.

pub mod design;
pub mod directory;
pub mod header;
pub mod items;
pub mod richtext;
pub mod timedate;
