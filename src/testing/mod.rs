//! Test support utilities
//!
//! Mock transport and shared test-logging setup used by unit and
//! integration tests.

pub mod mocks;

use once_cell::sync::Lazy;

static TEST_LOGGING: Lazy<()> = Lazy::new(|| {
    // Ignore failure: another harness thread may have installed a
    // subscriber already
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
});

/// Install the test tracing subscriber once per process
pub fn init_test_logging() {
    Lazy::force(&TEST_LOGGING);
}
