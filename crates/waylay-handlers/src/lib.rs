//! Concrete handlers built on the `waylay-core` contract (spec §4.5 and
//! the reference fixtures spec §8 names directly).

mod builtin;
mod multiplexed;

pub use builtin::{build_always_fail, build_noop, AlwaysFail, Noop};
pub use multiplexed::MultiplexedHandler;

use waylay_core::HandlerRegistry;

/// Register every handler this crate provides into `registry`. Called once
/// at process startup alongside whatever production handlers the binary
/// adds of its own (spec §4.3.1: "registration is additive and one-time").
pub fn register_all(registry: &mut HandlerRegistry) {
    registry.register("multiplexed", MultiplexedHandler::build);
    registry.register("noop", build_noop);
    registry.register("always_fail", build_always_fail);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_all_installs_every_reference_handler() {
        let mut registry = HandlerRegistry::new();
        register_all(&mut registry);
        assert!(registry.has("multiplexed"));
        assert!(registry.has("noop"));
        assert!(registry.has("always_fail"));
    }
}
