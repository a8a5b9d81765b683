//! External collaborators of the pipeline: enrichment providers and the chat model.
//!
//! Every provider sits behind an async trait in [`traits`] so the pipeline can
//! run against HTTP clients in production and scripted fakes in tests.

mod http;

pub mod company;
pub mod llm;
pub mod profile;
pub mod research;
pub mod traits;

pub use company::HttpCompanyProvider;
pub use http::build_client;
pub use llm::OpenAiChatModel;
pub use profile::HttpProfileProvider;
pub use research::HttpResearchProvider;
pub use traits::{
    CompanyProvider, Completion, LanguageModel, ProfileProvider, ProviderResult, ResearchProvider,
    TokenUsage,
};
