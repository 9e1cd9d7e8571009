pub mod config;
pub mod filter;
pub mod samples;
pub mod signing;
pub mod types;

/// Prefixed random identifier, e.g. `new_id("evt")` -> `evt_V1StGXR8_Z5jdHi6`.
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, nanoid::nanoid!(16))
}
