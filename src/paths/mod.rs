pub mod checks;
pub mod gpath;
pub mod gpath_hash;
pub mod gpath_store;
pub mod io;
pub mod threading;

pub use gpath::{GPath, LinkAdd, PathIndex, PATH_NULL};
pub use gpath_hash::GPathHash;
pub use gpath_store::GPathStore;
