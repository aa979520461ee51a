//! Test doubles shared by unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::Path;

use crate::executor::{CommandOutput, Executor};

/// Executor that records rendered command lines and replays scripted outputs.
///
/// Responses are matched by substring in registration order. When several outputs
/// are registered for one pattern they are returned in sequence; the last one repeats.
/// Unmatched commands succeed with empty output.
pub struct RecordingExecutor {
    commands: RefCell<Vec<String>>,
    uploads: RefCell<Vec<(String, String)>>,
    responses: RefCell<Vec<(String, VecDeque<CommandOutput>)>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            commands: RefCell::new(Vec::new()),
            uploads: RefCell::new(Vec::new()),
            responses: RefCell::new(Vec::new()),
        }
    }

    pub fn respond(&self, pattern: &str, output: CommandOutput) {
        let mut responses = self.responses.borrow_mut();
        if let Some((_, queue)) = responses.iter_mut().find(|(p, _)| p == pattern) {
            queue.push_back(output);
        } else {
            responses.push((pattern.to_string(), VecDeque::from([output])));
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    /// `(command, uploaded file content)` pairs in execution order.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.borrow().clone()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.commands.borrow().iter().any(|c| c.contains(needle))
    }

    pub fn position(&self, needle: &str) -> Option<usize> {
        self.commands.borrow().iter().position(|c| c.contains(needle))
    }

    fn next_output(&self, command: &str) -> CommandOutput {
        let mut responses = self.responses.borrow_mut();
        for (pattern, queue) in responses.iter_mut() {
            if command.contains(pattern.as_str()) {
                if queue.len() > 1 {
                    if let Some(output) = queue.pop_front() {
                        return output;
                    }
                }
                return queue.front().cloned().unwrap_or_default();
            }
        }
        CommandOutput::ok("")
    }
}

impl Executor for RecordingExecutor {
    fn target(&self) -> String {
        "deploy@test-host".to_string()
    }

    fn execute(&self, command: &str) -> CommandOutput {
        self.commands.borrow_mut().push(command.to_string());
        self.next_output(command)
    }

    fn execute_with_stdin(&self, command: &str, stdin_file: &Path) -> CommandOutput {
        let content = std::fs::read_to_string(stdin_file).unwrap_or_default();
        self.uploads
            .borrow_mut()
            .push((command.to_string(), content));
        self.execute(command)
    }
}
