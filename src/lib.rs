//! # Statesman: ASL-driven Workflow Interpretation
//!
//! Statesman executes **Amazon-States-Language-style (ASL) JSON state
//! machines** against a catalog of typed, registered domain methods. The
//! intended producer of those state machines is a large language model: the
//! catalog renders itself as a compact metadata document for the prompt, the
//! LLM answers with an ASL definition, and the interpreter runs it:
//! invoking domain methods, recording their outputs, and accumulating every
//! state's result into a single final value.
//!
//! ## Core Concepts
//!
//! - **Definition**: a `(StartAt, States)` machine with Pass/Task/Choice/
//!   Wait/Succeed/Fail/Map/Parallel states and the usual data plumbing
//!   (`InputPath`, `Parameters`, `ResultPath`, `OutputPath`)
//! - **Paths**: dotted `$.a.b.0.c` addressing into `serde_json::Value`
//! - **Catalog**: a dispatch table of async domain methods with declared
//!   parameter/return shapes, coercing JSON arguments before every call
//! - **Interpreter**: the dispatch loop, concurrent Map/Parallel execution,
//!   Wait timing, Choice predicates, Retry/Catch
//! - **Recorder**: an ordered side channel that Task handlers append to,
//!   rendered as plain text for the final LLM prompt
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use statesman::catalog::MethodCatalog;
//! use statesman::definition::StateMachine;
//! use statesman::interpreter::Interpreter;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let machine = StateMachine::from_json(
//!     r#"{
//!         "StartAt": "Greet",
//!         "States": {
//!             "Greet": { "Type": "Pass", "Result": { "text": "hello" }, "End": true }
//!         }
//!     }"#,
//! )?;
//!
//! let catalog = Arc::new(MethodCatalog::builder().build());
//! let interpreter = Interpreter::new(catalog);
//! let out = interpreter.interpret(&machine, json!({})).await?;
//!
//! assert_eq!(out, json!({ "Greet": { "text": "hello" } }));
//! # Ok(())
//! # }
//! ```
//!
//! ## Data Flow
//!
//! Two values travel through a run: the *current* value handed from state to
//! state, and a *global* accumulator that every state's output is merged
//! into. A state without an explicit `ResultPath` writes its output under
//! `$.<stateName>`, so each state's contribution stays observable in the
//! final value. Parameter templates resolve `.$`-suffixed keys against the
//! current value first and the accumulator second.
//!
//! ## Concurrency
//!
//! `Map` drives its iterator over the item sequence with at most
//! `MaxConcurrency` sub-interpretations in flight, re-assembling results in
//! input order. `Parallel` fans the same input out to every branch and
//! merges branch outputs in branch order. Both share the owning run's
//! catalog, recorder, and cancellation token; a signalled token aborts
//! pending waits and stops new work cooperatively.
//!
//! ## Module Guide
//!
//! - [`definition`] - ASL data model and static validation
//! - [`paths`] - path reads, writes, and value merging
//! - [`catalog`] - method registration, schema document, marshalling
//! - [`interpreter`] - the state machine dispatch loop
//! - [`recorder`] - recorded-output side channel and plain-text rendering
//! - [`analysis`] - LLM orchestration: synthesize, run, render
//! - [`cancel`] - cooperative cancellation token
//! - [`config`] - environment-driven orchestration settings

pub mod analysis;
pub mod cancel;
pub mod catalog;
pub mod config;
pub mod definition;
pub mod interpreter;
pub mod paths;
pub mod recorder;
