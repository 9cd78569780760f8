//! Registry implementations for fetching package releases

pub mod pypi;

pub use pypi::PypiRegistry;
