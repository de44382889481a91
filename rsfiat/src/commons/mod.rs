pub mod basic_functions;
pub mod spatial_join;

pub use basic_functions::OneOrMany;
