//! # Bridge Configuration
//!
//! Settings shared by every messenger in a process.
//!
//! Values are layered, later sources winning:
//!
//! 1. Built-in defaults
//! 2. Optional TOML file (`config/bridge.toml` unless a path is given)
//! 3. `BRIDGE_*` environment variables (`BRIDGE_STALE_TIME_MS=500`)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bridge_config::BridgeSettings;
//!
//! let settings = BridgeSettings::load(None).expect("valid bridge settings");
//! println!("caching responses for {:?}", settings.stale_time());
//! ```

pub mod settings;

pub use settings::{load_settings, BridgeSettings, DEFAULT_CONFIG_PATH, ENV_PREFIX};
