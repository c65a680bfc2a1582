use std::sync::Arc;

use axum::{
    http::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::{event, Level};

use crate::{
    authenticator::Authenticator, extract_token::extract_bearer_auth_value, identity::unauthorized,
};

/// Verifies the bearer token of each request and attaches the resulting
/// [crate::Identity] to the request extensions. Requests without a token pass
/// through unchanged; a token that fails verification is rejected with 401.
#[derive(Clone, Debug)]
pub struct AuthenticationLayer {
    authenticator: Arc<Authenticator>,
}

impl AuthenticationLayer {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }
}

impl<S> Layer<S> for AuthenticationLayer {
    type Service = AuthenticationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticationService {
            authenticator: self.authenticator.clone(),
            inner,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthenticationService<S> {
    authenticator: Arc<Authenticator>,
    inner: S,
}

impl<S, B> Service<Request<B>> for AuthenticationService<S>
where
    S: Service<Request<B>> + Send + Clone + 'static,
    S::Future: Send + 'static,
    S::Response: IntoResponse + Send + 'static,
    B: Send + 'static,
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

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);

        let verified = match extract_bearer_auth_value(req.headers()) {
            Ok(Some(token)) => Some(self.authenticator.verify(token)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        };

        Box::pin(async move {
            match verified {
                Some(Ok(identity)) => {
                    req.extensions_mut().insert(identity);
                }
                Some(Err(e)) => {
                    event!(Level::INFO, error = %e, "rejected credentials");
                    return Ok(unauthorized(e.error_kind(), Some(e.to_string())));
                }
                None => {}
            }

            Ok(inner.call(req).await?.into_response())
        })
    }
}
