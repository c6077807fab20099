// SPDX-License-Identifier: MIT OR Apache-2.0
//! `tlsca.v1.Health` service.
//!
//! Serving state is tracked per façade. An empty or absent service name asks
//! about the whole server, which serves only while both façades do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::proto::{health_server::Health, HealthCheckRequest, HealthCheckResponse, ServingStatus};

/// Fully qualified name of the public service.
pub const PUBLIC_SERVICE_NAME: &str = "tlsca.v1.TlscaPublic";

/// Fully qualified name of the admin service.
pub const ADMIN_SERVICE_NAME: &str = "tlsca.v1.TlscaAdmin";

/// The façades whose health is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlscaService {
    /// `tlsca.v1.TlscaPublic`.
    Public,
    /// `tlsca.v1.TlscaAdmin`.
    Admin,
}

impl TlscaService {
    /// Resolve a fully qualified gRPC service name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            PUBLIC_SERVICE_NAME => Some(Self::Public),
            ADMIN_SERVICE_NAME => Some(Self::Admin),
            _ => None,
        }
    }

    /// Fully qualified gRPC service name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Public => PUBLIC_SERVICE_NAME,
            Self::Admin => ADMIN_SERVICE_NAME,
        }
    }
}

/// Serving flags shared between the server and its health service.
#[derive(Debug)]
pub struct HealthState {
    public: AtomicBool,
    admin: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            public: AtomicBool::new(true),
            admin: AtomicBool::new(true),
        }
    }
}

impl HealthState {
    /// Both façades serving.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, service: TlscaService) -> &AtomicBool {
        match service {
            TlscaService::Public => &self.public,
            TlscaService::Admin => &self.admin,
        }
    }

    /// Mark `service` as serving or not.
    pub fn set_serving(&self, service: TlscaService, serving: bool) {
        let previous = self.flag(service).swap(serving, Ordering::SeqCst);
        if previous != serving {
            tracing::info!(service = service.name(), serving, "Health changed");
        }
    }

    /// Whether `service` is serving.
    #[must_use]
    pub fn is_serving(&self, service: TlscaService) -> bool {
        self.flag(service).load(Ordering::SeqCst)
    }

    /// Whether every façade is serving.
    #[must_use]
    pub fn is_all_serving(&self) -> bool {
        self.is_serving(TlscaService::Public) && self.is_serving(TlscaService::Admin)
    }

    /// Status reported for a `Check` on `service`.
    #[must_use]
    pub fn status_for(&self, service: Option<&str>) -> ServingStatus {
        let serving = match service.filter(|name| !name.is_empty()) {
            None => self.is_all_serving(),
            Some(name) => match TlscaService::from_name(name) {
                Some(known) => self.is_serving(known),
                None => {
                    tracing::warn!(service = name, "Health check for unknown service");
                    return ServingStatus::Unspecified;
                },
            },
        };

        if serving {
            ServingStatus::Serving
        } else {
            ServingStatus::NotServing
        }
    }
}

/// Implementation of the `Health` gRPC service.
#[derive(Debug, Clone, Default)]
pub struct HealthServiceImpl {
    state: Arc<HealthState>,
}

impl HealthServiceImpl {
    /// Health service over its own state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Health service over state shared with the server.
    #[must_use]
    pub fn with_state(state: Arc<HealthState>) -> Self {
        Self { state }
    }

    /// The shared state.
    #[must_use]
    pub fn state(&self) -> &Arc<HealthState> {
        &self.state
    }
}

#[tonic::async_trait]
impl Health for HealthServiceImpl {
    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let service = request.into_inner().service;
        let status = self.state.status_for(service.as_deref());

        Ok(Response::new(HealthCheckResponse {
            status: status.into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn check(service: &HealthServiceImpl, name: Option<&str>) -> ServingStatus {
        let request = Request::new(HealthCheckRequest {
            service: name.map(ToString::to_string),
        });
        let status = service.check(request).await.unwrap().into_inner().status;
        ServingStatus::try_from(status).unwrap()
    }

    #[test]
    fn test_service_names_round_trip() {
        for service in [TlscaService::Public, TlscaService::Admin] {
            assert_eq!(TlscaService::from_name(service.name()), Some(service));
        }
        assert_eq!(TlscaService::from_name("tlsca.v1.Health"), None);
    }

    #[tokio::test]
    async fn test_whole_server_serving() {
        let service = HealthServiceImpl::new();
        assert_eq!(check(&service, None).await, ServingStatus::Serving);
        assert_eq!(check(&service, Some("")).await, ServingStatus::Serving);
    }

    #[tokio::test]
    async fn test_unknown_service_is_unspecified() {
        let service = HealthServiceImpl::new();
        assert_eq!(
            check(&service, Some("grpc.health.v1.Health")).await,
            ServingStatus::Unspecified
        );
    }

    #[tokio::test]
    async fn test_admin_down_only_affects_admin_and_overall() {
        let state = Arc::new(HealthState::new());
        let service = HealthServiceImpl::with_state(Arc::clone(&state));

        state.set_serving(TlscaService::Admin, false);

        assert_eq!(
            check(&service, Some(ADMIN_SERVICE_NAME)).await,
            ServingStatus::NotServing
        );
        assert_eq!(
            check(&service, Some(PUBLIC_SERVICE_NAME)).await,
            ServingStatus::Serving
        );
        assert_eq!(check(&service, None).await, ServingStatus::NotServing);

        state.set_serving(TlscaService::Admin, true);
        assert!(state.is_all_serving());
    }
}
