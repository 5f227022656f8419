//! The controller state machine (§5). `is_allowed` is the single source
//! of truth for legal transitions; every state change in the driver loop
//! goes through it rather than being set ad hoc.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    Idle,
    Initializing,
    Ready,
    Processing,
    Playing,
    Paused,
    Stopping,
    Error,
}

// Mirrors the transition table exactly, with three additions named by
// operation descriptions rather than the table itself (see DESIGN.md):
// - `Ready -> Playing`: `Play`'s own description is "from
//   Ready/Paused/Processing -> Playing".
// - `{Initializing, Ready, Processing, Error} -> Stopping`: `Stop`'s own
//   description is "any active state -> Stopping -> Idle".
// - `Processing -> Ready`: the synthesis error-handling rule says a
//   non-retryable, non-fatal failure "surfaces the error and returns to
//   Ready without advancing the sentence" -- the only state that failure
//   can originate from is Processing (synthesizing the first sentence of
//   a just-parsed document, before ever reaching Playing).
// The converse edge implied by "otherwise transition to Ready" at
// end-of-document is NOT added, since the table never lists
// `Playing -> Ready`; end-of-document instead routes through the already-
// legal `Playing -> Stopping -> Idle` path.
const ALLOWED: &[(ControllerState, ControllerState)] = {
    use ControllerState::*;
    &[
        (Idle, Initializing),
        (Initializing, Ready),
        (Initializing, Error),
        (Initializing, Stopping),
        (Ready, Processing),
        (Ready, Idle),
        (Ready, Playing),
        (Ready, Stopping),
        (Processing, Playing),
        (Processing, Error),
        (Processing, Stopping),
        (Processing, Ready),
        (Playing, Paused),
        (Playing, Stopping),
        (Playing, Processing),
        (Paused, Playing),
        (Paused, Stopping),
        (Stopping, Idle),
        (Error, Idle),
        (Error, Initializing),
        (Error, Stopping),
    ]
};

pub fn is_allowed(from: ControllerState, to: ControllerState) -> bool {
    from == to || ALLOWED.iter().any(|(a, b)| *a == from && *b == to)
}
