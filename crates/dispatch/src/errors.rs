//! Error types for the dispatch domain.
//!
//! Infrastructure adapters map their transport-level failures into
//! [`HostError`] / [`CompletionError`]; the handler layer wraps both in
//! [`HandlerError`] together with the one failure class the handlers produce
//! themselves (an undecodable task document).
//!
//! There is deliberately no retry policy here: every external-call failure is
//! final for the event that triggered it. Document absence is not an error at
//! all; fetches surface it as `Ok(None)` so handlers can reply with guidance
//! instead of failing.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Source-control host errors
// ---------------------------------------------------------------------------

/// Failure talking to the source-control host.
///
/// `Api` carries the upstream status and response body verbatim so the text
/// can be surfaced to the requesting human unchanged.
#[derive(Debug, Error)]
pub enum HostError {
    /// The App credentials could not be used: unparseable private key, failed
    /// assertion signing, or a rejected token exchange.
    ///
    /// Produced by: the host connector, before any repository API call.
    #[error("host authentication failed: {reason}")]
    Credentials {
        /// Description of the credential failure.
        reason: String,
    },

    /// The host API answered with a non-success status other than 404.
    #[error("host api {operation} failed with status {status}: {body}")]
    Api {
        /// Short label of the attempted operation (e.g. `"create comment"`).
        operation: String,
        /// HTTP status returned by the host.
        status: u16,
        /// Response body, propagated verbatim.
        body: String,
    },

    /// The request never produced an HTTP response (connection, TLS, DNS).
    #[error("host api {operation} request failed: {reason}")]
    Transport {
        /// Short label of the attempted operation.
        operation: String,
        /// Transport-level failure description.
        reason: String,
    },

    /// The host answered successfully but the payload did not have the
    /// expected shape (missing field, undecodable content encoding).
    #[error("host api {operation} returned an invalid response: {reason}")]
    InvalidResponse {
        /// Short label of the attempted operation.
        operation: String,
        /// What was wrong with the payload.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Generative-text provider errors
// ---------------------------------------------------------------------------

/// Failure invoking the generative-text service.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Non-success HTTP status; the body is kept verbatim so quota and model
    /// errors reach the requesting human undistorted.
    #[error("completion request failed with status {status}: {body}")]
    Api {
        /// HTTP status returned by the service.
        status: u16,
        /// Response body, propagated verbatim.
        body: String,
    },

    /// The request never produced an HTTP response.
    #[error("completion request failed: {reason}")]
    Transport {
        /// Transport-level failure description.
        reason: String,
    },

    /// The service answered successfully but without a usable text block.
    #[error("completion response was invalid: {reason}")]
    InvalidResponse {
        /// What was wrong with the payload.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Handler errors
// ---------------------------------------------------------------------------

/// Failure inside a command handler.
///
/// Everything here happens after the processing acknowledgment, so the
/// dispatcher converts each variant into a user-visible reply comment rather
/// than dropping the event.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The task document exists but is not valid JSON of the expected shape.
    ///
    /// Distinct from document absence, which handlers answer with guidance
    /// text instead of an error.
    #[error("task document at {path} could not be decoded: {reason}")]
    Format {
        /// Repository path of the offending document.
        path: String,
        /// Decode failure description.
        reason: String,
    },

    /// A source-control host call failed.
    #[error(transparent)]
    Host(#[from] HostError),

    /// The generative-text call failed.
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

impl HandlerError {
    /// Renders this failure as the reply comment body shown to the requester.
    ///
    /// Upstream bodies are passed through verbatim; scrubbing secrets out of
    /// them is the operator's configuration responsibility.
    pub fn to_reply_body(&self) -> String {
        match self {
            HandlerError::Format { path, reason } => format!(
                "The task document at `{path}` exists but could not be parsed: {reason}"
            ),
            HandlerError::Host(error) => {
                format!("A GitHub API call failed while handling this command:\n\n```\n{error}\n```")
            }
            HandlerError::Completion(error) => {
                format!("The analysis request failed:\n\n```\n{error}\n```")
            }
        }
    }
}
