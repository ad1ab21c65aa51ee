mod billing;
mod license;
mod usage;

pub use billing::*;
pub use license::*;
pub use usage::*;
