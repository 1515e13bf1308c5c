use std::sync::Arc;

use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::{PgWireError, PgWireResult};

use crate::identity::PrincipalDirectory;

/// Cleartext password lookup against the principal directory.
#[derive(Debug)]
pub struct DirectoryAuthSource {
    directory: Arc<PrincipalDirectory>,
}

impl DirectoryAuthSource {
    pub fn new(directory: Arc<PrincipalDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl AuthSource for DirectoryAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let user = login.user().unwrap_or_default();
        match self.directory.password_for(user) {
            Some(password) => Ok(Password::new(None, password.as_bytes().to_vec())),
            None => {
                metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
                tracing::warn!("login refused for unknown user {user:?}");
                Err(PgWireError::InvalidPassword(user.to_string()))
            }
        }
    }
}
