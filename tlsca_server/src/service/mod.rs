// SPDX-License-Identifier: MIT OR Apache-2.0
//! gRPC service implementations.

pub mod admin;
pub mod health;
pub mod public;

pub use admin::TlscaAdminService;
pub use health::{
    HealthServiceImpl, HealthState, TlscaService, ADMIN_SERVICE_NAME, PUBLIC_SERVICE_NAME,
};
pub use public::TlscaPublicService;
