use super::types::ElementRef;
use super::Score;
use crate::errors::ScoreError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A reversible score mutation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// An element was added to the score
    Add(ElementRef),
    AppendPart(usize),
    AppendStaff(usize),
    /// Commands grouped together (e.g. a whole import)
    Batch { commands: Vec<Command> },
}

impl Command {
    /// Undo this command (reverse the operation)
    pub fn undo(&self, score: &mut Score) -> Result<(), ScoreError> {
        match self {
            Command::Add(element) => score.remove_element(*element),
            Command::AppendPart(index) => score.remove_part(*index),
            Command::AppendStaff(index) => score.remove_staff(*index),
            Command::Batch { commands } => {
                // Undo batch in reverse order
                for cmd in commands.iter().rev() {
                    cmd.undo(score)?;
                }
                Ok(())
            }
        }
    }

    /// Number of primitive commands
    pub fn len(&self) -> usize {
        match self {
            Command::Batch { commands } => commands.iter().map(Command::len).sum(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// History of score mutations, optionally grouped in batches
#[derive(Clone, Debug, PartialEq)]
pub struct UndoStack {
    /// Stack of commands that can be undone
    pub commands: VecDeque<Command>,
    /// Maximum number of commands to keep in history
    max_size: usize,
    /// Current batch being accumulated (if any)
    current_batch: Option<Vec<Command>>,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(100)
    }
}

impl UndoStack {
    pub fn new(max_size: usize) -> Self {
        Self {
            commands: VecDeque::new(),
            max_size,
            current_batch: None,
        }
    }

    /// Record a command; it joins the open batch if there is one
    pub fn push(&mut self, command: Command) {
        match self.current_batch {
            Some(ref mut batch) => batch.push(command),
            None => self.push_finalized(command),
        }
    }

    pub fn begin_batch(&mut self) {
        self.finalize_batch();
        self.current_batch = Some(Vec::new());
    }

    pub fn in_batch(&self) -> bool {
        self.current_batch.is_some()
    }

    /// Finalize the current batch and add it to the undo stack
    pub fn finalize_batch(&mut self) {
        if let Some(mut batch) = self.current_batch.take() {
            match batch.len() {
                0 => {}
                1 => {
                    if let Some(command) = batch.pop() {
                        self.push_finalized(command);
                    }
                }
                _ => self.push_finalized(Command::Batch { commands: batch }),
            }
        }
    }

    fn push_finalized(&mut self, command: Command) {
        self.commands.push_back(command);

        // Enforce max size
        if self.commands.len() > self.max_size {
            self.commands.pop_front();
        }
    }

    /// Take the most recent command off the stack
    pub fn pop(&mut self) -> Option<Command> {
        self.finalize_batch();
        self.commands.pop_back()
    }

    pub fn can_undo(&self) -> bool {
        !self.commands.is_empty() || self.current_batch.as_ref().map_or(false, |b| !b.is_empty())
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.current_batch = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_groups_commands() {
        let mut stack = UndoStack::new(10);
        stack.begin_batch();
        stack.push(Command::AppendPart(0));
        stack.push(Command::AppendStaff(0));
        assert!(stack.in_batch());
        stack.finalize_batch();

        assert_eq!(stack.commands.len(), 1);
        assert_eq!(stack.commands[0].len(), 2);
    }

    #[test]
    fn test_single_command_batch_is_unwrapped() {
        let mut stack = UndoStack::new(10);
        stack.begin_batch();
        stack.push(Command::AppendPart(0));
        assert_eq!(stack.pop(), Some(Command::AppendPart(0)));
        assert!(!stack.can_undo());
    }

    #[test]
    fn test_max_size_drops_oldest() {
        let mut stack = UndoStack::new(2);
        stack.push(Command::AppendPart(0));
        stack.push(Command::AppendPart(1));
        stack.push(Command::AppendPart(2));
        assert_eq!(stack.commands.len(), 2);
        assert_eq!(stack.commands[0], Command::AppendPart(1));
    }
}
