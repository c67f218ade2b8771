//! Method and path dispatch

use crate::handlers::{HealthHandler, S3Handler};
use crate::http::{GatewayResponse, InboundRequest};
use http::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Health,
    Ready,
    Version,
    ListBuckets,
    CreateBucket,
    ListObjects,
    PutObject,
    GetObject,
    HeadObject,
    DeleteObject,
    MethodNotAllowed,
}

impl Route {
    pub fn resolve(method: &Method, path: &str) -> Self {
        if *method == Method::GET {
            match path {
                "/health" => return Self::Health,
                "/ready" => return Self::Ready,
                "/version" => return Self::Version,
                _ => {}
            }
        }

        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return match *method {
                Method::GET => Self::ListBuckets,
                _ => Self::MethodNotAllowed,
            };
        }

        let is_bucket = match trimmed.split_once('/') {
            None => true,
            Some((_, rest)) => rest.is_empty(),
        };
        if is_bucket {
            return match *method {
                Method::GET => Self::ListObjects,
                Method::PUT => Self::CreateBucket,
                _ => Self::MethodNotAllowed,
            };
        }

        match *method {
            Method::PUT => Self::PutObject,
            Method::GET => Self::GetObject,
            Method::HEAD => Self::HeadObject,
            Method::DELETE => Self::DeleteObject,
            _ => Self::MethodNotAllowed,
        }
    }
}

/// The full request surface of the gateway
pub struct Gateway {
    s3: S3Handler,
    health: HealthHandler,
}

impl Gateway {
    pub fn new(s3: S3Handler, health: HealthHandler) -> Self {
        Self { s3, health }
    }

    pub async fn handle(&self, request: &InboundRequest) -> GatewayResponse {
        match Route::resolve(&request.method, &request.path) {
            Route::Health => self.health.health(),
            Route::Ready => self.health.ready().await,
            Route::Version => self.health.version(),
            Route::ListBuckets => self.s3.list_buckets(request).await,
            Route::CreateBucket => self.s3.create_bucket(request).await,
            Route::ListObjects => self.s3.list_objects(request).await,
            Route::PutObject => self.s3.put_object(request).await,
            Route::GetObject => self.s3.get_object(request).await,
            Route::HeadObject => self.s3.head_object(request).await,
            Route::DeleteObject => self.s3.delete_object(request).await,
            Route::MethodNotAllowed => GatewayResponse::s3_error(
                405,
                "MethodNotAllowed",
                format!("The specified method is not allowed against this resource: {}", request.method),
            ),
        }
    }
}
