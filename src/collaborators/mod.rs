//! External collaborator contracts (§6).
//!
//! The boot stub, hardware initialization, VGA output, physical memory
//! detector, interactive shell, and example modules are out of scope
//! (§1) and live outside this crate. What the core needs from them is a
//! small set of contracts, stated here as traits with a minimal in-memory
//! implementation of each so the four in-scope components can be built
//! and tested standalone.

pub mod heap;
pub mod interrupt;
pub mod log;
pub mod runtime;

pub use heap::{Heap, HeapStats, InMemoryHeap};
pub use interrupt::{InterruptDispatcher, NoopInterruptDispatcher};
pub use log::{CapturingLogSink, LogLevel, LogSink, TracingLogSink};
pub use runtime::{ModuleRuntime, StubModuleRuntime};
