mod settings;

pub use settings::{ClientConfig, ReconnectPolicy, EXAMPLE_CONFIG};
