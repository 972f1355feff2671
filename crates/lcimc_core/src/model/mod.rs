mod dataset;
mod ids;
mod index;
mod outputs;
mod uncertainty;

pub use dataset::{Activity, Dataset, Exchange, Flow};
pub use ids::{ActivityKey, FlowKey, FunctionalUnit};
pub use index::{IndexDict, ReferenceIndex};
pub use outputs::{OutputKind, OutputSelection};
pub use uncertainty::Uncertainty;
