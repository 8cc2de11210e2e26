//! Lowering from Crystal's function model to the target's.
//!
//! Both passes run on a fully typed tree:
//!
//! - [`globalize_inner_functions`] moves nested and anonymous functions to
//!   the top level, turning captured variables into arguments.
//! - [`lower_foreach`] rewrites `foreach` into the target's `map` or
//!   `fold`.

mod foreach;
mod globalize;

pub use foreach::lower_foreach;
pub use globalize::globalize_inner_functions;
