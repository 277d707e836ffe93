/// Default page size for provider-backed listings (mailboxes, calendar)
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Maximum page size forwarded to a provider
pub const MAX_PAGE_SIZE: u32 = 100;

// =============================================================================
// ROLE CONSTANTS
// =============================================================================

/// Administrator role - may reset rate limiters
pub const ROLE_ADMIN: &str = "admin";
