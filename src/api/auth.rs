//! Bearer token authentication for the management API.

use crate::api::actix_error::ApiError;
use crate::config::AuthConfig;
use crate::error::Error;

use actix_web::{
    Error as ActixError,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::Method,
};
use futures::future::{LocalBoxFuture, Ready, ready};
use std::sync::Arc;

/// Authentication middleware factory
pub struct Authentication {
    config: Arc<AuthConfig>,
}

impl Authentication {
    /// Create a new Authentication middleware
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self { config }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Transform = AuthenticationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticationMiddleware {
            service,
            config: self.config.clone(),
        }))
    }
}

/// Authentication middleware implementation
pub struct AuthenticationMiddleware<S> {
    service: S,
    config: Arc<AuthConfig>,
}

impl<S> AuthenticationMiddleware<S> {
    fn is_authorized(&self, req: &ServiceRequest) -> bool {
        // CORS preflight carries no credentials
        if req.method() == Method::OPTIONS {
            return true;
        }

        let Some(bearer) = &self.config.bearer else {
            return true;
        };

        req.headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|token| token == bearer.token.as_str())
    }
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.is_authorized(&req) {
            let fut = self.service.call(req);
            return Box::pin(fut);
        }

        tracing::warn!(path = %req.path(), "Authentication failed: Invalid or missing bearer token");
        Box::pin(async move {
            Err(ApiError::from(Error::Unauthorized(
                "Invalid or missing bearer token".to_string(),
            ))
            .into())
        })
    }
}
