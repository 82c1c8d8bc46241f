use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Change-feed listen address, e.g. `"tcp://127.0.0.1:9600"`.
    pub listen: String,
}
