use std::net::SocketAddr;

use crate::daemon::OrchdConfig;

/// Structural validation run right after parsing.
pub fn validate(config: &OrchdConfig) -> anyhow::Result<()> {
    let listen = &config.server.listen;
    let addr = listen
        .strip_prefix("tcp://")
        .ok_or_else(|| anyhow::anyhow!("server.listen must start with tcp://, got {listen:?}"))?;
    addr.parse::<SocketAddr>()
        .map_err(|e| anyhow::anyhow!("server.listen {listen:?}: {e}"))?;

    if config.runtime.tick_interval.as_duration().is_zero() {
        anyhow::bail!("runtime.tick_interval must be greater than zero");
    }
    if config.runtime.channel_capacity == 0 {
        anyhow::bail!("runtime.channel_capacity must be greater than zero");
    }

    Ok(())
}
