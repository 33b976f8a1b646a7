//! Restricted-mode guard, checked at the top of every writer entry point
//! before it takes the process lock.
//!
//! An external onboarding subsystem marks a workspace restricted by the
//! mere presence of `.copilot-state/restricted.flag`; readers ignore it,
//! every writer must check it first.

use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::paths;

pub fn ensure_writable(workspace: &Path) -> CoreResult<()> {
    if paths::restricted_flag(workspace).exists() {
        return Err(CoreError::Restricted);
    }
    Ok(())
}
