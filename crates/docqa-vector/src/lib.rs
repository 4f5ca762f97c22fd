//! Vector index: concurrent build from chunks, exact similarity search, and
//! persistence to a directory backed by LanceDB.

pub mod build;
pub mod index;
pub mod schema;
pub mod store;
pub mod table;

pub use build::{build_index, BuildOptions};
pub use index::{IndexEntry, VectorIndex};
pub use store::{index_exists, read_manifest, IndexManifest};
