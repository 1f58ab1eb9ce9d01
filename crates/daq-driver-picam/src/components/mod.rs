//! Picam driver components
//!
//! - `connection`: camera handle ownership (master/slave)
//! - `attributes`: vendor attribute to descriptor translation
//! - `ordering`: priority sort and exclusion of descriptor lists
//! - `roi`: ROI sub-tree helpers
//! - `acquisition`: start/stop and online-setting toggling
//! - `waiter`: blocking frame waits off the async runtime

pub mod acquisition;
pub mod attributes;
pub mod connection;
pub mod ordering;
pub mod roi;
pub mod waiter;
