//! Fuzzing harnesses for the statebus accessor surface.
//!
//! The harnesses operate on heap-backed segments, without touching real
//! shared memory, to test the field invariants of the protocol.

pub mod bus_model;
