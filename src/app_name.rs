//! Application identity and the private directories derived from it

use std::path::PathBuf;

/// Application identifier used to locate save data and settings
///
/// Directories follow the platform conventions of the `directories` crate:
/// - Linux: `$XDG_DATA_HOME/<app>` and `$XDG_CONFIG_HOME/<app>`
/// - macOS: `~/Library/Application Support/<qualifier>.<org>.<app>`
/// - Windows: `%APPDATA%\<org>\<app>`
///
/// # Example
///
/// ```
/// use savestate::AppName;
///
/// let app_name = AppName::new("com", "acme", "roadrunner");
/// assert_eq!(app_name.application, "roadrunner");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppName {
    pub qualifier: String,
    pub organization: String,
    pub application: String,
}

impl AppName {
    /// Create a new application name
    ///
    /// * `qualifier` - Typically a reverse domain name (e.g., "com", "org")
    /// * `organization` - Your organization or username
    /// * `application` - The application name
    pub fn new(
        qualifier: impl Into<String>,
        organization: impl Into<String>,
        application: impl Into<String>,
    ) -> Self {
        Self {
            qualifier: qualifier.into(),
            organization: organization.into(),
            application: application.into(),
        }
    }

    fn project_dirs(&self) -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from(
            self.qualifier.as_str(),
            self.organization.as_str(),
            self.application.as_str(),
        )
    }

    /// Writable directory for save files
    ///
    /// Falls back to `./<application>` when the platform has no home directory.
    pub fn data_dir(&self) -> PathBuf {
        self.project_dirs()
            .map(|dirs| dirs.data_local_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".").join(&self.application))
    }

    /// Directory holding settings and the preference registry
    pub fn config_dir(&self) -> PathBuf {
        self.project_dirs()
            .map(|dirs| dirs.config_local_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".").join(&self.application))
    }
}
