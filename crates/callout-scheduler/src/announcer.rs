//! Announcer contract

use crate::command::{CalloutCommand, Priority};
use std::time::Duration;

/// Speech (and optional haptic) output.
///
/// `announce` returns `false` when the output is unavailable; the command is
/// then dropped without retry.
pub trait Announcer {
    fn announce(&mut self, text: &str, priority: Priority) -> bool;

    /// Play an on/off vibration pattern. No-op by default.
    fn vibrate(&mut self, _pattern: &[Duration]) {}

    /// Announce a full command. Announcers that report completion
    /// asynchronously override this to keep the ticket.
    fn announce_command(&mut self, command: &CalloutCommand) -> bool {
        self.announce(&command.text, command.priority)
    }

    /// Whether completion is reported later through
    /// [`CalloutScheduler::complete`](crate::CalloutScheduler::complete).
    /// Synchronous announcers are done when `announce` returns.
    fn completes_async(&self) -> bool {
        false
    }
}
