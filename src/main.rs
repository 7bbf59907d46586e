//! # Craft Engine Entry Point
//!
//! Runs the headless demo. `CRAFT_SETTINGS` and `CRAFT_TYPES` may point at
//! JSON files; `RUST_LOG` controls logging.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release
//! ```

fn main() {
    craft_engine::run();
}
