pub mod registry;

#[allow(unused_imports)]
pub use registry::{
    MockFeed, MockRegistry, create_test_context, days_ago, fixed_now, zip_with_pkg_info,
};
