//! §4.2/§4.7: a `Configurator` is the factory for an object's default
//! [`Params`]. The graphical configuration dialog itself is the explicitly
//! out-of-scope graphical shell (§1); only the parameter factory survives
//! here.

use crate::{category::Category, params::Params};

pub trait Configurator: Send + Sync {
    fn category(&self) -> Category;
    fn name(&self) -> &str;
    fn make_params(&self) -> Params;
}
