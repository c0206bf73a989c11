//! Posting rules: policies and the document state machine.

pub mod policy;
pub mod state;

pub use policy::{
    DEFAULT_WARNING_DAYS, FlexiblePolicy, OpenPolicy, PostingPolicy, StrictPolicy, build_policy,
};
pub use state::{DocumentStateMachine, PostTransition, UnpostTransition};
