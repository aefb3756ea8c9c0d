//! botcheck harness
//!
//! Drives scripted conversations against a chat bot and decides, turn by
//! turn, whether to answer, retry or stop.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RunOrchestrator                        │
//! │    for scenario, for template (sequential, never aborts)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ConversationDriver::run(transport, ctx, scenario, starter) │
//! │    ├── send pending text                                    │
//! │    ├── await first fragment → settle → aggregate turn       │
//! │    ├── ResponseClassifier::classify(turn, scenario)         │
//! │    └── reply / retry once / end ok / end err                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport                                                  │
//! │    ├── ScriptedTransport   (in memory, tests + simulate)    │
//! │    └── PlaywrightTransport (Node.js bridge, real browser)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod log;
pub mod playwright;
pub mod runner;
pub mod scripted;
pub mod transport;

pub use config::HarnessConfig;
pub use context::{FixedChooser, RandomChooser, Randomization, RunContext, ValueChooser};
pub use driver::{ConversationDriver, DriverConfig, RunReport};
pub use error::{HarnessError, HarnessResult};
pub use log::{ConversationLog, EventKind, LogEvent};
pub use playwright::{PlaywrightConfig, PlaywrightTransport};
pub use runner::{RunOrchestrator, SuiteResult, TemplateResult};
pub use scripted::{Script, ScriptedTransport, ScriptedTurn};
pub use transport::{sanitize_message, Transport};
