//! `vanguard_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - Deterministic and modular where practical.
//! - Clear separation of concerns (net, world, assets, config).
//! - Traits for abstraction and dependency injection.
//! - No `unsafe`.

pub mod archetype;
pub mod assets;
pub mod commands;
pub mod components;
pub mod config;
pub mod math;
pub mod net;
pub mod outputs;
pub mod physics;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::archetype::*;
    pub use crate::commands::*;
    pub use crate::components::*;
    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::world::*;
}
