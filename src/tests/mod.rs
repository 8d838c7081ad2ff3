mod test_mnn;
mod test_params;
mod test_reduction;

/// Initialize logging for tests
pub fn init() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}
