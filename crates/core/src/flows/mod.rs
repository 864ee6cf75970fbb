pub mod engine;
pub mod states;

pub use engine::{CreateEventFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{
    DialogueAction, DialogueEvent, DialoguePhase, DialogueState, FlowContext, TransitionOutcome,
};
