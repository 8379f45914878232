use ballot_log::TargetsExt;
use log::level_filters::LevelFilter;
use parking_lot::Once;
use tracing_subscriber::{filter::Targets, layer::SubscriberExt, util::SubscriberInitExt};

pub use ballot_test_log_proc_macro::test;

static INITIALIZE: Once = Once::new();

#[doc(hidden)]
pub fn initialize() {
    INITIALIZE.call_once(|| {
        // Another test harness may already have installed a subscriber.
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .with(
                Targets::new()
                    .with_default(LevelFilter::INFO)
                    .with_ballot_targets(LevelFilter::DEBUG)
                    .with_env(),
            )
            .try_init();
    });
}
