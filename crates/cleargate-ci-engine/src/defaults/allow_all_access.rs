//! Access manager that permits everything.

use crate::errors::AccessError;
use crate::traits::AccessManager;
use crate::types::BuildRequestEvent;

/// Grants every permission. Suitable for single-user installs and tests.
pub struct AllowAllAccessManager;

impl AccessManager for AllowAllAccessManager {
    fn ensure_permission(
        &self,
        _principal: &str,
        _action: &str,
        _request: &BuildRequestEvent,
    ) -> Result<(), AccessError> {
        Ok(())
    }
}
