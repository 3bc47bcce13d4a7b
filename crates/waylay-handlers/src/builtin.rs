//! Reference handlers used by the test suite (spec §8 scenarios 1 and 3).
//!
//! Not production handler bodies — the concrete mail/shell/HTTP/syslog/SMS
//! handlers are explicitly out of scope (spec §1) — but `noop` and
//! `always_fail` are named directly by the spec's own scenario text, so
//! they live here rather than scattered across test modules.

use serde_json::Value;
use waylay_core::{Handler, HandlerBuildError, HandlerContext};

/// Always succeeds. Spec §8 scenario 1 ("enqueue and execute").
pub struct Noop;

#[async_trait::async_trait]
impl Handler for Noop {
    async fn perform(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> String {
        "noop".to_string()
    }
}

pub fn build_noop(_ctx: &HandlerContext, _params: &Value) -> Result<Box<dyn Handler>, HandlerBuildError> {
    Ok(Box::new(Noop))
}

/// Always fails with a fixed message. Spec §8 scenario 3
/// ("retry-then-fail").
pub struct AlwaysFail;

#[async_trait::async_trait]
impl Handler for AlwaysFail {
    async fn perform(&self) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("always_fail handler deliberately failed"))
    }

    fn name(&self) -> String {
        "always_fail".to_string()
    }
}

pub fn build_always_fail(
    _ctx: &HandlerContext,
    _params: &Value,
) -> Result<Box<dyn Handler>, HandlerBuildError> {
    Ok(Box::new(AlwaysFail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_succeeds() {
        assert!(Noop.perform().await.is_ok());
    }

    #[tokio::test]
    async fn always_fail_fails() {
        assert!(AlwaysFail.perform().await.is_err());
    }
}
