/// The application name
pub const NAME: &str = "gcf-hello";

/// The application version
pub const VERSION: &str = env!("BUILD_VERSION");
