//! Registry trait for fetching release history and project metadata

#[cfg(test)]
use mockall::automock;

use crate::version::error::RegistryError;
use crate::version::types::{PackageMetadata, ReleaseInfo};

/// Trait for fetching package information from a registry
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    /// Fetches every published release of a package
    ///
    /// # Arguments
    /// * `package_name` - The name of the package as written in the manifest
    ///
    /// # Returns
    /// * `Ok(Vec<ReleaseInfo>)` - Releases in no particular order
    /// * `Err(RegistryError)` - If the fetch fails
    async fn get_versions(&self, package_name: &str) -> Result<Vec<ReleaseInfo>, RegistryError>;

    /// Fetches project metadata (homepage, license, changelog and latest version)
    async fn get_metadata(&self, package_name: &str) -> Result<PackageMetadata, RegistryError>;

    /// Fetches the licenses declared by one release
    ///
    /// An empty list means the release declares none.
    async fn get_release_licenses(
        &self,
        package_name: &str,
        version: &str,
    ) -> Result<Vec<String>, RegistryError>;

    /// Downloads a distribution archive referenced directly by URL
    async fn download(&self, url: &str) -> Result<Vec<u8>, RegistryError>;
}
