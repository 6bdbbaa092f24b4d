//! Solution files: where they are (`finder`), what they declare (`parser`)
//! and the immutable model both produce (`types`).

pub mod finder;
pub mod parser;
pub mod types;

pub use finder::{SolutionFinder, SolutionLocation, SOLUTION_EXTENSION};
pub use parser::{decode, parse, parse_file, rename_declaration};
pub use types::{
    ParseWarning, ProjectInSolution, ProjectType, Solution, SolutionEntry, SolutionFolder,
};
