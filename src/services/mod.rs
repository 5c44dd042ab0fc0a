//! Service layer: the project store, the AI client and the pipelines that
//! tie uploads, the store and the AI client together.

pub mod ai_client;
pub mod documents;
pub mod estimates;
pub mod retry;
pub mod scopes;
pub mod store;

pub use ai_client::AiClient;
pub use store::{JsonFileSnapshot, ProjectStore};
