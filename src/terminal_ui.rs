use std::borrow::Cow;
use crate::styling::STYLER;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::Helper;
use rustyline::Context as RustylineContext;

/// REPL commands with their argument hint.
pub const COMMANDS: &[(&str, &str)] = &[
    ("help", ""),
    ("new", ""),
    ("sessions", ""),
    ("switch", " <n>"),
    ("delete", " <n>"),
    ("list", ""),
    ("regen", " [message_id]"),
    ("think", " <message_id>"),
    ("models", ""),
    ("use", " <provider> <model>"),
    ("prompt", " <prompt_id>"),
    ("clear", ""),
    ("exit", ""),
    ("quit", ""),
];

pub struct ChatHelper {
    prompt_ids: Vec<String>,
    provider_ids: Vec<String>,
}

impl ChatHelper {
    pub fn new(prompt_ids: Vec<String>, provider_ids: Vec<String>) -> Self {
        Self { prompt_ids, provider_ids }
    }

    fn argument_values(&self, command: &str) -> &[String] {
        match command {
            "!prompt" => &self.prompt_ids,
            "!use" => &self.provider_ids,
            _ => &[],
        }
    }
}

impl Helper for ChatHelper {}

impl Highlighter for ChatHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(&self, prompt: &'p str, _default: bool) -> Cow<'b, str> {
        Cow::Owned(STYLER.prompt_style(prompt).to_string())
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(STYLER.dim_gray_style(hint).to_string())
    }

    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let Some(first_word) = line.split_whitespace().next() else {
            return Cow::Borrowed(line);
        };
        if !line.starts_with('!') {
            return Cow::Borrowed(line);
        }

        let mut styled_line = String::with_capacity(line.len() + 20);
        styled_line.push_str(&STYLER.info_style(first_word).to_string());
        styled_line.push_str(&line[first_word.len()..]);
        Cow::Owned(styled_line)
    }
}

impl Validator for ChatHelper {
    fn validate(&self, _ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        Ok(ValidationResult::Valid(None))
    }

    fn validate_while_typing(&self) -> bool {
        false
    }
}

impl Hinter for ChatHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &RustylineContext) -> Option<Self::Hint> {
        if pos < line.len() || !line.starts_with('!') {
            return None;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["!"] => Some("help for commands".to_string()),
            [cmd] if !line.ends_with(' ') => {
                let typed = &cmd[1..];
                COMMANDS
                    .iter()
                    .find(|(name, _)| name.starts_with(typed))
                    .map(|(name, args)| format!("{}{}", &name[typed.len()..], args))
                    .filter(|hint| !hint.is_empty())
            }
            [cmd] => COMMANDS
                .iter()
                .find(|(name, _)| *name == &cmd[1..])
                .map(|(_, args)| args.trim_start().to_string())
                .filter(|args| !args.is_empty()),
            _ => None,
        }
    }
}

impl Completer for ChatHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, _ctx: &RustylineContext) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        if !line.starts_with('!') {
            return Ok((0, Vec::new()));
        }

        let head = &line[..pos];
        let parts: Vec<&str> = head.split_whitespace().collect();
        let completing_new_word = head.ends_with(' ');

        let (start_pos, candidates) = match (parts.as_slice(), completing_new_word) {
            ([cmd], false) => {
                let prefix = &cmd[1..];
                (1, COMMANDS
                    .iter()
                    .filter(|(name, _)| name.starts_with(prefix))
                    .map(|(name, _)| Pair {
                        display: format!("!{}", name),
                        replacement: name.to_string(),
                    })
                    .collect())
            }
            ([cmd], true) => (pos, self.pairs(cmd, "")),
            ([cmd, arg], false) => (pos - arg.len(), self.pairs(cmd, arg)),
            _ => (0, Vec::new()),
        };

        Ok((start_pos, candidates))
    }
}

impl ChatHelper {
    fn pairs(&self, command: &str, prefix: &str) -> Vec<Pair> {
        self.argument_values(command)
            .iter()
            .filter(|value| value.starts_with(prefix))
            .map(|value| Pair { display: value.clone(), replacement: value.clone() })
            .collect()
    }
}
