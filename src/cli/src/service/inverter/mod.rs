pub(crate) mod derive;
pub(crate) mod model;
pub(crate) mod scrape;
pub(crate) mod snapshot;

pub(crate) use model::{clean_model, resolve};
pub(crate) use scrape::*;
pub(crate) use snapshot::Snapshot;
