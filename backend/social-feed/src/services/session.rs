use std::sync::RwLock;

/// Who is signed in. Authentication itself lives outside the core.
pub trait SessionContext: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}

/// Session whose user is set explicitly (sign-in/sign-out from the embedding app)
#[derive(Default)]
pub struct StaticSession {
    user_id: RwLock<Option<String>>,
}

impl StaticSession {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user_id: RwLock::new(Some(user_id.into())),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        let mut slot = self.user_id.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        let mut slot = self.user_id.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

impl SessionContext for StaticSession {
    fn current_user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
