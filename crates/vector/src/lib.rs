pub mod mock;
pub mod rest;
pub mod retriever;

pub use mock::ScriptedRetriever;
pub use rest::RestVectorClient;
pub use retriever::{Chunk, ContextRetriever};
