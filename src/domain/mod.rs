pub mod bucket;
pub mod energy;
pub mod prices;
pub mod types;

pub use bucket::*;
pub use energy::*;
pub use prices::*;
pub use types::*;
