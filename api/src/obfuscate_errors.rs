use axum::{
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use visuasort_http_errors::ErrorResponseData;

/// In production, replaces the body of internal and authorization errors so
/// that causes are logged but not shown to clients.
#[derive(Clone, Debug)]
pub struct ObfuscateErrorLayer {
    enabled: bool,
}

impl ObfuscateErrorLayer {
    pub fn new(enabled: bool) -> ObfuscateErrorLayer {
        ObfuscateErrorLayer { enabled }
    }
}

impl<S> Layer<S> for ObfuscateErrorLayer {
    type Service = ObfuscateError<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ObfuscateError {
            inner,
            enabled: self.enabled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObfuscateError<S> {
    inner: S,
    enabled: bool,
}

fn replacement(status: StatusCode) -> Option<(&'static str, &'static str)> {
    match status {
        StatusCode::INTERNAL_SERVER_ERROR => Some(("internal_server_error", "Internal error")),
        StatusCode::UNAUTHORIZED => Some(("unauthorized", "Unauthorized")),
        StatusCode::FORBIDDEN => Some(("forbidden", "Forbidden")),
        _ => None,
    }
}

impl<S, B> Service<Request<B>> for ObfuscateError<S>
where
    S: Service<Request<B>> + Send + 'static,
    S::Future: Send + 'static,
    S::Response: IntoResponse + Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let enabled = self.enabled;
        let fut = self.inner.call(req);
        Box::pin(async move {
            let res = fut.await?.into_response();
            if !enabled {
                return Ok(res);
            }

            let status = res.status();
            match replacement(status) {
                Some((kind, message)) => {
                    Ok(ErrorResponseData::new(kind, message).into_response_with(status))
                }
                None => Ok(res),
            }
        })
    }
}
