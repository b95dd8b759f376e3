pub mod asset;
pub mod observation;

pub use asset::{AssetSpec, SourceParams};
pub use observation::{Category, Observation, PricePoint};
