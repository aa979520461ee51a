#![allow(dead_code)]

use std::cell::RefCell;
use std::path::Path;

use deckhand::executor::{CommandOutput, Executor};

/// Executor replaying scripted responses. The first registered substring found in a
/// command line wins; anything unscripted succeeds with no output.
#[derive(Default)]
pub struct ScriptedHost {
    rules: Vec<(String, CommandOutput)>,
    log: RefCell<Vec<String>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, output: CommandOutput) -> Self {
        self.rules.push((needle.to_string(), output));
        self
    }

    pub fn missing(self, needle: &str) -> Self {
        self.on(needle, CommandOutput::failure(1, ""))
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn position(&self, needle: &str) -> Option<usize> {
        self.log.borrow().iter().position(|c| c.contains(needle))
    }

    fn respond(&self, command: &str) -> CommandOutput {
        self.log.borrow_mut().push(command.to_string());
        self.rules
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok(""))
    }
}

impl Executor for ScriptedHost {
    fn target(&self) -> String {
        "deploy@web1".to_string()
    }

    fn execute(&self, command: &str) -> CommandOutput {
        self.respond(command)
    }

    fn execute_with_stdin(&self, command: &str, _stdin_file: &Path) -> CommandOutput {
        self.respond(command)
    }
}
