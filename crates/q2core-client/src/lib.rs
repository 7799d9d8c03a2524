#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::float_cmp)]

//! Client-side pieces that sit on top of the renderer: the particle pool
//! and its generic effects, the inventory screen and the key binding table.

pub mod keys;
pub mod cl_particles;
pub mod cl_inventory;

pub use cl_inventory::{Inventory, InventoryView};
pub use cl_particles::ParticleSystem;

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init_tracing() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::TRACE)
                .try_init();
        });
    }
}
