//! Turns an upload into a notice body.
//!
//! - [`cleaner`]: strips links, markup and boilerplate from a description and
//!   segments it into bullets
//! - [`summary`]: assembles title, bullets, tags and the watch link

pub mod cleaner;
pub mod summary;

pub use summary::build_summary;
