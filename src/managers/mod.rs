pub mod describer;
pub mod ingredients;
pub mod recipes;
pub mod voice;
