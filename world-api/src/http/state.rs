use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use crate::session::SessionStore;
use crate::store::WorldStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn WorldStore>,
    pub sessions: SessionStore,
    pub cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}
