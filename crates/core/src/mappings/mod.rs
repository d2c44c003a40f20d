pub mod matcher;
mod mappings_model;
mod mappings_traits;

pub use mappings_model::{NewMapping, ProductChannelMapping};
pub use mappings_traits::MappingRepositoryTrait;
pub use matcher::{propose_matches, MatchProposal, MatchSource, MatcherConfig};
