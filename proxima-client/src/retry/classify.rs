//! Classify errors into transient (retry) and permanent (surface) failures.
//!
//! The transport tags the known transient server conditions as
//! [`ClientError::NoWorker`] and [`ClientError::ServerTimeout`]. The server
//! only reports those conditions as free text, so errors that never passed
//! through the transport are matched by message as a fallback. That fallback is
//! fragile: a reworded server message silently turns a transient failure into a
//! permanent one.

use std::error::Error as StdError;

use crate::error::ClientError;

/// Server message when no worker slot was available to start the task
const NO_WORKER_SIGNATURE: &str = "got no worker upid";

/// Server message when an internal wait timed out
const SERVER_TIMEOUT_SIGNATURE: &str = "got timeout";

/// Iterate over an error and every error in its source chain
fn chain<'a>(
    err: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

/// Whether a retry has a fair chance of succeeding
///
/// True for HTTP 5xx responses and for the "no worker" and "timeout"
/// signatures of an overloaded node. Everything else (4xx, not found,
/// validation, parse errors) is permanent.
pub fn is_transient(err: &(dyn StdError + 'static)) -> bool {
    chain(err).any(|e| {
        if let Some(client_error) = e.downcast_ref::<ClientError>() {
            return match client_error {
                ClientError::NoWorker { .. } | ClientError::ServerTimeout { .. } => true,
                ClientError::ApiError { status, .. } => *status >= 500,
                _ => false,
            };
        }

        let message = e.to_string();
        message.contains(NO_WORKER_SIGNATURE) || message.contains(SERVER_TIMEOUT_SIGNATURE)
    })
}

/// Predicate matching errors whose message, or any source's message, contains `substr`
pub fn error_contains(
    substr: impl Into<String>,
) -> impl Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static {
    let substr = substr.into();
    move |err: &(dyn StdError + 'static)| chain(err).any(|e| e.to_string().contains(&substr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    /// Caller-side wrapper that keeps the original error as its source
    #[derive(Debug)]
    struct Wrapped(Box<dyn StdError + Send + Sync>);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "error cloning container")
        }
    }

    impl StdError for Wrapped {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(self.0.as_ref())
        }
    }

    #[derive(Debug)]
    struct Message(&'static str);

    impl fmt::Display for Message {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl StdError for Message {}

    #[test]
    fn test_status_codes() {
        let cases = [
            (500, true),
            (502, true),
            (503, true),
            (400, false),
            (403, false),
            (404, false),
        ];

        for (status, expected) in cases {
            let err = ClientError::api_error(status, "reason");
            assert_eq!(is_transient(&err), expected, "status {status}");
        }
    }

    #[test]
    fn test_permanent_client_errors() {
        assert!(!is_transient(&ClientError::NotFound("vm 100".into())));
        assert!(!is_transient(&ClientError::NoData));
        assert!(!is_transient(&ClientError::Cancelled));
        assert!(!is_transient(&Message("something else")));
    }

    #[test]
    fn test_tagged_conditions() {
        assert!(is_transient(&ClientError::NoWorker { status: 500 }));
        assert!(is_transient(&ClientError::ServerTimeout { status: 596 }));
    }

    #[test]
    fn test_free_text_signatures() {
        assert!(is_transient(&Message("got no worker upid - start worker failed")));
        assert!(is_transient(&Message("got timeout")));
    }

    #[test]
    fn test_inspects_wrapped_errors() {
        let wrapped = Wrapped(Box::new(ClientError::api_error(503, "busy")));
        assert!(is_transient(&wrapped));

        let wrapped = Wrapped(Box::new(Message("got no worker upid")));
        assert!(is_transient(&wrapped));

        let wrapped = Wrapped(Box::new(ClientError::api_error(400, "bad")));
        assert!(!is_transient(&wrapped));
    }

    #[test]
    fn test_inspects_anyhow_chains() {
        let err =
            anyhow::Error::new(ClientError::api_error(500, "boom")).context("creating VM 100");
        let err: &(dyn StdError + 'static) = err.as_ref();
        assert!(is_transient(err));
    }

    #[test]
    fn test_error_contains() {
        let check = error_contains("already exists");

        assert!(check(&Message("container 100 already exists")));
        assert!(!check(&Message("something else")));
        assert!(check(&Wrapped(Box::new(ClientError::api_error(
            500,
            "unable to create CT 100 - CT 100 already exists on node 'pve'"
        )))));
    }
}
