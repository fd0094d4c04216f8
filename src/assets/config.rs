use std::sync::Arc;

use crate::settings::CspSettings;

#[derive(Clone)]
pub struct AssetsState {
    /// Route policy, shared with the middleware
    pub settings: Arc<CspSettings>,
}

impl AssetsState {
    pub fn new(settings: Arc<CspSettings>) -> Self {
        Self { settings }
    }

    /// Get the login route (e.g., "/login")
    pub fn login_path(&self) -> &str {
        &self.settings.login_path
    }

    /// Get the admin route prefix (e.g., "/admin")
    pub fn admin_path(&self) -> &str {
        &self.settings.admin_path
    }
}
