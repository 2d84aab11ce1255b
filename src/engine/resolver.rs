//! Effective-settings resolution.
//!
//! Trader-specific settings win outright when active; otherwise the
//! follower's active global record applies. Records never merge, and an
//! inactive trader-specific record does not shadow the global one.

use crate::db::EngineStore;
use crate::errors::EngineError;
use crate::models::CopySettings;

/// Resolve the settings governing one (follower, trader) pair.
/// `None` means "do not copy", not an error.
pub async fn resolve_settings<S: EngineStore + Sync>(
    store: &S,
    follower_id: &str,
    trader: &str,
) -> Result<Option<CopySettings>, EngineError> {
    if let Some(specific) = store.trader_settings(follower_id, trader).await? {
        if specific.is_active {
            return Ok(Some(specific));
        }
    }

    match store.global_settings(follower_id).await? {
        Some(global) if global.is_active => Ok(Some(global)),
        _ => Ok(None),
    }
}
