//! Federated login: provider clients and account linking.

pub mod github;
pub mod google;
pub mod linker;
pub mod provider;

pub use github::GithubProvider;
pub use google::GoogleProvider;
pub use linker::{IdentityLinker, IdentityService};
pub use provider::{
    IdentityProvider, ProviderConfig, ProviderError, ProviderProfile, ProviderRegistry,
};
