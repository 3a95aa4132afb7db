use tokio_util::sync::CancellationToken;

use crate::policy::AccessMode;

/// Per-request values the core reads while serving one message
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub tenant_id: String,
    pub user_id: String,
    pub mode: AccessMode,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new<T: Into<String>, U: Into<String>>(tenant_id: T, user_id: U) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
