//! Operator interaction.

use anyhow::Result;
use dialoguer::{Confirm, Input, Select};

pub trait Prompt {
    fn confirm(&self, message: &str) -> Result<bool>;
    fn input(&self, message: &str) -> Result<String>;
    /// `None` when the operator backs out.
    fn select(&self, message: &str, items: &[String]) -> Result<Option<usize>>;
    fn note(&self, message: &str);
}

/// Prompts on the terminal; `--yes` answers every confirmation.
pub struct TerminalPrompt {
    assume_yes: bool,
}

impl TerminalPrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Prompt for TerminalPrompt {
    fn confirm(&self, message: &str) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        Ok(Confirm::new().with_prompt(message).default(false).interact()?)
    }

    fn input(&self, message: &str) -> Result<String> {
        Ok(Input::<String>::new().with_prompt(message).interact_text()?)
    }

    fn select(&self, message: &str, items: &[String]) -> Result<Option<usize>> {
        Ok(Select::new()
            .with_prompt(message)
            .items(items)
            .default(0)
            .interact_opt()?)
    }

    fn note(&self, message: &str) {
        eprintln!("{}", message);
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned answers and records what was asked.
    #[derive(Default)]
    pub struct ScriptedPrompt {
        pub confirms: RefCell<VecDeque<bool>>,
        pub inputs: RefCell<VecDeque<String>>,
        pub selections: RefCell<VecDeque<Option<usize>>>,
        pub asked: RefCell<Vec<String>>,
        pub notes: RefCell<Vec<String>>,
        pub offered: RefCell<Vec<Vec<String>>>,
    }

    impl ScriptedPrompt {
        pub fn confirming(answers: &[bool]) -> Self {
            let prompt = Self::default();
            prompt.confirms.borrow_mut().extend(answers.iter().copied());
            prompt
        }
    }

    impl Prompt for ScriptedPrompt {
        fn confirm(&self, message: &str) -> Result<bool> {
            self.asked.borrow_mut().push(message.to_string());
            Ok(self.confirms.borrow_mut().pop_front().unwrap_or(false))
        }

        fn input(&self, message: &str) -> Result<String> {
            self.asked.borrow_mut().push(message.to_string());
            Ok(self.inputs.borrow_mut().pop_front().unwrap_or_default())
        }

        fn select(&self, message: &str, items: &[String]) -> Result<Option<usize>> {
            self.asked.borrow_mut().push(message.to_string());
            self.offered.borrow_mut().push(items.to_vec());
            Ok(self.selections.borrow_mut().pop_front().flatten())
        }

        fn note(&self, message: &str) {
            self.notes.borrow_mut().push(message.to_string());
        }
    }
}
