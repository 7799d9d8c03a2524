#![allow(clippy::too_many_arguments, clippy::manual_range_contains, clippy::float_cmp,
         clippy::needless_range_loop, clippy::type_complexity, clippy::len_without_is_empty)]

pub mod q_shared;
pub mod wildcards;
pub mod common;
pub mod cvar;
pub mod cmd;
