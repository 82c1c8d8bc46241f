use std::process::Command;

/// Hook run when the global sampling toggle flips. Failures are logged by the
/// caller and otherwise ignored; the reconciler never retries.
pub trait SamplingService: Send {
    fn apply(&self, enable: bool) -> anyhow::Result<()>;
}

/// Drives the host sampling daemon through the service manager:
/// restart on enable, stop on disable.
pub struct SystemService {
    unit: String,
}

impl SystemService {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }
}

impl SamplingService for SystemService {
    fn apply(&self, enable: bool) -> anyhow::Result<()> {
        let action = if enable { "restart" } else { "stop" };
        let status = Command::new("service").arg(&self.unit).arg(action).status()?;
        if !status.success() {
            anyhow::bail!("service {} {action} exited with {status}", self.unit);
        }
        Ok(())
    }
}

/// No-op hook for environments without a service manager.
pub struct NullSamplingService;

impl SamplingService for NullSamplingService {
    fn apply(&self, _enable: bool) -> anyhow::Result<()> {
        Ok(())
    }
}
