//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements           | Connects to                 |
//! |---------------|----------------------|-----------------------------|
//! | `config_file` | ConfigPort           | JSON file on disk           |
//! | `log_sink`    | EventSink, AlertSink | `log` facade                |
//! | `sim`         | ValvePort, BoilerPort| In-memory simulated plant   |

pub mod config_file;
pub mod log_sink;
pub mod sim;
