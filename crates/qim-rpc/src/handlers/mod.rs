//! Control-plane handlers and registration.

pub mod service;
pub mod services;

use crate::registry::ControlRegistry;

/// Reserved name of the service-listing method.
pub const SERVICES_METHOD: &str = "services";
/// Reserved name of the service-description method.
pub const SERVICE_METHOD: &str = "service";

/// Register every control-plane handler with the registry.
pub fn register_control(registry: &mut ControlRegistry) {
    registry.register(SERVICES_METHOD, services::ListServicesHandler);
    registry.register(SERVICE_METHOD, service::DescribeServiceHandler);
}
