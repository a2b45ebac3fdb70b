// Utility functions for Exliar VFIO

/// Logging setup for the binary; the library only uses the `log` facade
pub mod logging {
    use env_logger::Env;

    /// Default filter when RUST_LOG is not set
    pub fn default_filter(verbose: bool) -> &'static str {
        if verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Installs env_logger. RUST_LOG wins over `verbose`.
    /// Calling it more than once is harmless.
    pub fn init(verbose: bool) {
        let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default_filter(verbose)))
            .format_timestamp_secs()
            .try_init();
    }

}
