mod feature;
mod image;
mod metadata;
mod naming;
mod outcome;
mod service_metadata;

#[rustfmt::skip]
pub use {
    feature::*,
    image::*,
    metadata::*,
    naming::*,
    outcome::*,
    service_metadata::*,
};
