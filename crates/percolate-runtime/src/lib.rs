//! Rule compiler, stochastic update engine, and simulation driver.
//!
//! A textual process definition (see `percolate-dsl`) is compiled into a
//! [`RuleProcess`]: validated rule tables, slot-resolved rate expressions,
//! and mean-field counters. A [`Simulation`] then drives it over a network
//! with a fixed time step, one uniform draw per entity per iteration,
//! reporting through an [`OutputSink`].

pub mod compiler;
pub mod distribution;
pub mod error;
pub mod expr;
pub mod meanfield;
pub mod output;
pub mod process;
pub mod simulation;
pub mod state;

pub use compiler::{CompiledRule, CompiledRules, RuleGroup};
pub use error::{Error, Result};
pub use expr::{CompiledExpr, QueryHost};
pub use meanfield::MeanFieldTracker;
pub use output::{FileSink, MemorySink, OutputSink, RunManifest, SinkError, StateSample};
pub use process::{Outcome, RuleProcess, StateModel};
pub use simulation::{RunState, Simulation, SimulationOptions};
pub use state::{AttributeSet, FullState, PartialState};
