use std::{
    path::PathBuf,
    sync::{Mutex, OnceLock},
};

use leadscore::app_dirs::HOME_ENV;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct LeadscoreEnvGuard {
    previous: Option<String>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl LeadscoreEnvGuard {
    pub fn set_home(path: PathBuf) -> Self {
        let lock = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        let previous = std::env::var(HOME_ENV).ok();
        // SAFETY: tests run under a global lock to prevent concurrent env mutations.
        unsafe {
            std::env::set_var(HOME_ENV, path);
        }
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for LeadscoreEnvGuard {
    fn drop(&mut self) {
        if let Some(value) = self.previous.take() {
            // SAFETY: tests run under a global lock to prevent concurrent env mutations.
            unsafe {
                std::env::set_var(HOME_ENV, value);
            }
        } else {
            // SAFETY: tests run under a global lock to prevent concurrent env mutations.
            unsafe {
                std::env::remove_var(HOME_ENV);
            }
        }
    }
}
