//! Request dispatch onto the decision engine

use antibrute_core::{AuthEngine, BucketCounts, Request, Response, Result};

/// Run one request against the engine
///
/// Errors never escape: they come back as `Response::Error` so the client
/// can tell a validation failure from a backend failure.
pub async fn dispatch(engine: &AuthEngine, request: Request) -> Response {
    let name = request.name();
    match execute(engine, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(request = name, kind = ?e.kind(), "Request failed: {}", e);
            Response::error(&e)
        }
    }
}

async fn execute(engine: &AuthEngine, request: Request) -> Result<Response> {
    let response = match request {
        Request::Auth(req) => Response::Auth {
            ok: engine.auth(&req).await?,
        },
        Request::AddToBlackList { ip } => {
            engine.add_to_blacklist(&ip).await?;
            Response::Done
        }
        Request::AddToWhiteList { ip } => {
            engine.add_to_whitelist(&ip).await?;
            Response::Done
        }
        Request::RemoveFromBlackList { ip } => {
            engine.remove_from_blacklist(&ip).await?;
            Response::Done
        }
        Request::RemoveFromWhiteList { ip } => {
            engine.remove_from_whitelist(&ip).await?;
            Response::Done
        }
        Request::ClearBucket(req) => {
            engine.clear_bucket(&req).await?;
            Response::Done
        }
        Request::ClearBlackList => {
            engine.clear_blacklist().await?;
            Response::Done
        }
        Request::ClearWhiteList => {
            engine.clear_whitelist().await?;
            Response::Done
        }
        Request::CountBuckets => {
            let counts: BucketCounts = engine.count_buckets().await?;
            Response::BucketCounts(counts)
        }
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use antibrute_core::{AuthRequest, ClearBucketRequest, ErrorKind, Limits, ManualClock};
    use std::sync::Arc;

    fn engine() -> AuthEngine {
        let limits = Limits {
            login: 1,
            ..Limits::default()
        };
        AuthEngine::with_clock(limits, Arc::new(ManualClock::new())).unwrap()
    }

    fn auth(login: &str, ip: &str) -> Request {
        Request::Auth(AuthRequest::new(login, "secret", ip))
    }

    #[tokio::test]
    async fn test_dispatch_auth() {
        let engine = engine();
        assert_eq!(dispatch(&engine, auth("alice", "1.1.1.1")).await, Response::Auth { ok: true });
        assert_eq!(dispatch(&engine, auth("alice", "1.1.1.1")).await, Response::Auth { ok: false });
    }

    #[tokio::test]
    async fn test_dispatch_list_admin() {
        let engine = engine();
        let add = Request::AddToBlackList { ip: "10.0.0.0/8".into() };
        assert_eq!(dispatch(&engine, add).await, Response::Done);
        assert_eq!(dispatch(&engine, auth("bob", "10.1.2.3")).await, Response::Auth { ok: false });

        let remove = Request::RemoveFromBlackList { ip: "10.0.0.0/8".into() };
        assert_eq!(dispatch(&engine, remove).await, Response::Done);
        assert_eq!(dispatch(&engine, auth("bob", "10.1.2.3")).await, Response::Auth { ok: true });

        let white = Request::AddToWhiteList { ip: "10.1.2.3".into() };
        assert_eq!(dispatch(&engine, white).await, Response::Done);
        assert_eq!(dispatch(&engine, auth("bob", "10.1.2.3")).await, Response::Auth { ok: true });

        assert_eq!(dispatch(&engine, Request::ClearWhiteList).await, Response::Done);
        assert_eq!(dispatch(&engine, Request::ClearBlackList).await, Response::Done);
        let remove = Request::RemoveFromWhiteList { ip: "10.1.2.3".into() };
        assert_eq!(dispatch(&engine, remove).await, Response::Done);
    }

    #[tokio::test]
    async fn test_dispatch_buckets() {
        let engine = engine();
        dispatch(&engine, auth("alice", "1.1.1.1")).await;
        assert_eq!(
            dispatch(&engine, Request::CountBuckets).await,
            Response::BucketCounts(BucketCounts { login: 1, password: 1, ip: 1 })
        );

        let clear = Request::ClearBucket(ClearBucketRequest::default().login("alice"));
        assert_eq!(dispatch(&engine, clear).await, Response::Done);
        assert_eq!(dispatch(&engine, auth("alice", "1.1.1.1")).await, Response::Auth { ok: true });
    }

    #[tokio::test]
    async fn test_dispatch_validation_error() {
        let engine = engine();
        match dispatch(&engine, auth("alice", "1.1.1.0/24")).await {
            Response::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::Validation);
                assert!(message.contains("mask"));
            }
            other => panic!("Expected Error response, got {:?}", other),
        }

        let bad = Request::AddToWhiteList { ip: "nope".into() };
        assert!(matches!(
            dispatch(&engine, bad).await,
            Response::Error { kind: ErrorKind::Validation, .. }
        ));
    }
}
