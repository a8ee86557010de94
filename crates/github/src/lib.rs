//! RalphWorks GitHub infrastructure adapter.
//!
//! Implements the GitHub-facing traits defined in the [`dispatch`] crate
//! ([`dispatch::ports::RepositoryHost`], [`dispatch::ports::HostConnector`])
//! over the REST API.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. All GitHub
//! API details (App authentication, token exchange, endpoint paths,
//! content-negotiation headers, base64 contents decoding) are handled here;
//! the [`dispatch`] crate never sees them.
//!
//! ## Credential flow
//!
//! [`auth::AppAuthenticator`] signs a short-lived RS256 assertion with the
//! App's private key and exchanges it for an installation token;
//! [`client::GithubConnector`] wraps that exchange behind the domain's
//! connector trait, producing one authenticated [`client::GithubClient`] per
//! dispatch. Tokens are never cached across dispatches.

pub mod auth;
pub mod client;

pub use auth::{AppAuthenticator, AppCredentials};
pub use client::{GithubClient, GithubConnector, GITHUB_API_BASE};
