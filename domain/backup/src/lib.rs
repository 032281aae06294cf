//! Domain model of the volume backup engine.
//!
//! Entities and value objects, the exception taxonomy, repository traits for
//! the persistence collaborators, and the service traits every backend
//! backup implementation is built from.

pub mod exception;
#[cfg(feature = "mock")]
pub mod mock;
pub mod model;
pub mod repository;
pub mod service;
