/// Default page size for pagination
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Maximum page size allowed
pub const MAX_PAGE_SIZE: i64 = 100;

/// Title carried by every dispatch notification
pub const DISPATCH_TITLE: &str = "New Accident";

// =============================================================================
// ROLE CONSTANTS
// =============================================================================

/// Operator role - can verify or reject reports and inspect presence
pub const ROLE_ADMIN: &str = "admin";

/// Ambulance driver role - can subscribe to zones and accept dispatches
pub const ROLE_DRIVER: &str = "driver";
