//! Versioned store names: `<appName>-<scope>-v<version>`.

/// Store names owned by one worker version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    /// App shell and immutable assets, populated at install.
    pub precache: String,
    /// Opportunistically filled while serving requests.
    pub runtime: String,
}

impl CacheNames {
    pub fn new(app_name: &str, version: &str) -> Self {
        Self { precache: store_name(app_name, "app", version), runtime: store_name(app_name, "runtime", version) }
    }

    /// The activation allow-list.
    pub fn current(&self) -> [&str; 2] {
        [self.precache.as_str(), self.runtime.as_str()]
    }

    pub fn is_current(&self, name: &str) -> bool {
        self.current().contains(&name)
    }
}

pub fn store_name(app_name: &str, scope: &str, version: &str) -> String {
    format!("{app_name}-{scope}-v{version}")
}
