pub mod library;

pub use library::{OutputShape, PromptKey, PromptLibrary, Template};
