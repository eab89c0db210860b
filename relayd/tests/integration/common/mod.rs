pub mod fixtures;

pub use fixtures::RelayRoot;
pub use logging::init_test_logging;
