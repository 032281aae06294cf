mod rbd;

pub use rbd::{RbdCliBackend, BACKEND_TYPE};
