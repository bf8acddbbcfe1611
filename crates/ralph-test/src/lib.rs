//! Test fakes for the four collaborator traits `ralph-core` defines
//! (`RoundTripClient`, `OutputSink`, `ToolRegistry`, `ConversationStore`).
//!
//! Grounded in the teacher's `astrid-test::mocks::MockFrontend`
//! queue-based design: canned responses are enqueued by the test ahead of
//! time, and the fake records what it was asked to do so the test can
//! assert on it afterward.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod fakes;

pub use fakes::{FakeConversationStore, FakeOutputSink, FakeRoundTripClient, FakeToolRegistry, OutputEvent};
