// error and utility modules
pub mod error;
pub mod utility;

// data module
pub mod data {
    pub mod spectrum;
    pub mod peak;
    pub mod consolidated;
    pub mod project;
}

// algorithm module
pub mod algorithm {
    pub mod similarity;
    pub mod alignment;
    pub mod comparison;
    pub mod consolidate;
    pub mod filter;
}
