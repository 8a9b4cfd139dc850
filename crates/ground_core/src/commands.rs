//! The slice of the command system the locomotion core touches.
//!
//! The core only ever reads the head of a unit's queue and performs three
//! writes: appending `Wait` commands on arrival, rewriting the recorded
//! position of the front move order, and popping nothing — consumption is
//! the command AI's job.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec3Fixed};

/// A queued unit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Move to a position.
    Move(Vec3Fixed),
    /// Trailing speed cap automatically attached to every move order.
    SetWantedMaxSpeed(#[serde(with = "fixed_serde")] Fixed),
    /// Hold until released.
    Wait,
    /// Construct at a position (the goal radius becomes the build range).
    Build(Vec3Fixed),
}

/// Queue of pending orders for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandQueue {
    commands: VecDeque<Command>,
}

impl CommandQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            commands: VecDeque::new(),
        }
    }

    /// Append a command.
    pub fn give(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The order currently at the head.
    #[must_use]
    pub fn head(&self) -> Option<&Command> {
        self.commands.front()
    }

    /// Whether the head order is a plain move (an empty queue counts).
    #[must_use]
    pub fn head_is_move(&self) -> bool {
        matches!(self.commands.front(), None | Some(Command::Move(_)))
    }

    /// Whether any order beyond the head is a move.
    #[must_use]
    pub fn has_more_move_commands(&self) -> bool {
        self.commands
            .iter()
            .skip(1)
            .any(|c| matches!(c, Command::Move(_)))
    }

    /// Rewrite the recorded position of the front move order.
    pub fn set_front_move_pos(&mut self, pos: Vec3Fixed) {
        if let Some(Command::Move(p)) = self.commands.front_mut() {
            *p = pos;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_head_counts_as_move() {
        let q = CommandQueue::new();
        assert!(q.head_is_move());
    }

    #[test]
    fn test_head_is_move() {
        let mut q = CommandQueue::new();
        q.give(Command::Wait);
        assert!(!q.head_is_move());

        let mut q = CommandQueue::new();
        q.give(Command::Move(Vec3Fixed::from_ints(10, 0, 10)));
        q.give(Command::SetWantedMaxSpeed(Fixed::from_num(2)));
        assert!(q.head_is_move());
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_has_more_move_commands() {
        let mut q = CommandQueue::new();
        q.give(Command::Move(Vec3Fixed::ZERO));
        assert!(!q.has_more_move_commands());
        q.give(Command::Move(Vec3Fixed::from_ints(5, 0, 5)));
        assert!(q.has_more_move_commands());
    }

    #[test]
    fn test_set_front_move_pos() {
        let mut q = CommandQueue::new();
        q.give(Command::Move(Vec3Fixed::ZERO));
        let target = Vec3Fixed::from_ints(9, 0, 9);
        q.set_front_move_pos(target);
        assert_eq!(q.head(), Some(&Command::Move(target)));
    }
}
