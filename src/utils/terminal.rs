//! Line-based terminal prompts
//!
//! Questions go to stderr so stdout stays clean for command output. Each
//! answer is a single letter; an empty line picks the default, and end of
//! input picks the safe choice.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use crate::callbacks::{Decider, Notice};
use crate::types::{RetryChoice, RetryContext, SaveChoice, WriteChoice};

/// [`Decider`] that asks on the controlling terminal
pub struct TerminalDecider {
	input: Mutex<Box<dyn BufRead + Send>>,
}

impl TerminalDecider {
	pub fn new() -> Self {
		Self::with_input(Box::new(io::BufReader::new(io::stdin())))
	}

	/// Read answers from any line source
	pub fn with_input(input: Box<dyn BufRead + Send>) -> Self {
		TerminalDecider { input: Mutex::new(input) }
	}

	/// Block until a line (or end of input) is read
	pub fn pause(&self) {
		let mut input = match self.input.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		let mut line = String::new();
		let _ = input.read_line(&mut line);
	}

	/// Ask until a valid letter is given. `None` on end of input.
	fn ask(&self, question: &str, choices: &[(char, &str)], default: char) -> Option<char> {
		let menu: Vec<String> = choices
			.iter()
			.map(|(c, label)| {
				if *c == default {
					format!("[{}] {}", c.to_ascii_uppercase(), label)
				} else {
					format!("[{}] {}", c, label)
				}
			})
			.collect();

		let mut input = match self.input.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		loop {
			let mut err = io::stderr();
			let _ = write!(err, "{}\n  {} > ", question, menu.join("  "));
			let _ = err.flush();

			let mut line = String::new();
			match input.read_line(&mut line) {
				Ok(0) | Err(_) => {
					let _ = writeln!(err);
					return None;
				}
				Ok(_) => {}
			}
			if let Some(answer) = parse_answer(&line, choices, default) {
				return Some(answer);
			}
			let _ = writeln!(err, "Please answer with one of the letters shown.");
		}
	}
}

impl Default for TerminalDecider {
	fn default() -> Self {
		Self::new()
	}
}

impl Decider for TerminalDecider {
	fn confirm_proceed_write_or_demo(&self) -> WriteChoice {
		let choices = [('u', "update the shared database"), ('d', "demo only"), ('q', "quit")];
		match self.ask("Do you want to update the shared database, or just run a demo?", &choices, 'u') {
			Some('u') => WriteChoice::ReadWrite,
			Some('d') => WriteChoice::Demo,
			_ => WriteChoice::Abort,
		}
	}

	fn confirm_save_or_discard(&self) -> SaveChoice {
		let choices = [('s', "save"), ('d', "discard"), ('l', "decide later")];
		match self.ask("Save your changes to the shared database?", &choices, 's') {
			Some('s') => SaveChoice::Save,
			Some('d') => SaveChoice::Discard,
			_ => SaveChoice::Abort,
		}
	}

	fn confirm_retry_or_abort(&self, context: RetryContext, message: &str) -> RetryChoice {
		let give_up = match context {
			RetryContext::Probe | RetryContext::Checkout => "continue in demo mode",
			RetryContext::Checkin => "keep changes for later",
			RetryContext::Discard => "forget the checkout",
		};
		let choices = [('r', "retry"), ('g', give_up), ('a', "abort")];
		let question = format!("{}\nTry again?", message);
		match self.ask(&question, &choices, 'r') {
			Some('r') => RetryChoice::Retry,
			Some('g') => RetryChoice::GiveUp,
			_ => RetryChoice::Abort,
		}
	}

	fn notify(&self, notice: &Notice) {
		eprintln!("{}", notice);
	}
}

/// First letter of the trimmed line, case-insensitive; empty picks `default`
fn parse_answer(line: &str, choices: &[(char, &str)], default: char) -> Option<char> {
	let trimmed = line.trim();
	let letter = match trimmed.chars().next() {
		None => default,
		Some(c) => c.to_ascii_lowercase(),
	};
	choices.iter().map(|(c, _)| *c).find(|c| *c == letter)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	fn decider(input: &str) -> TerminalDecider {
		TerminalDecider::with_input(Box::new(Cursor::new(input.to_string().into_bytes())))
	}

	#[test]
	fn test_parse_answer() {
		let choices = [('s', "save"), ('d', "discard")];
		assert_eq!(parse_answer("\n", &choices, 's'), Some('s'));
		assert_eq!(parse_answer("  Discard\n", &choices, 's'), Some('d'));
		assert_eq!(parse_answer("x\n", &choices, 's'), None);
	}

	#[test]
	fn test_prompts_reask_on_invalid_input() {
		let d = decider("maybe\nd\n");
		assert_eq!(d.confirm_proceed_write_or_demo(), WriteChoice::Demo);
	}

	#[test]
	fn test_end_of_input_is_safe_choice() {
		let d = decider("");
		assert_eq!(d.confirm_save_or_discard(), SaveChoice::Abort);
		assert_eq!(d.confirm_retry_or_abort(RetryContext::Checkin, "offline"), RetryChoice::Abort);
	}

	#[test]
	fn test_retry_answers() {
		let d = decider("g\n\n");
		assert_eq!(d.confirm_retry_or_abort(RetryContext::Probe, "x"), RetryChoice::GiveUp);
		assert_eq!(d.confirm_retry_or_abort(RetryContext::Probe, "x"), RetryChoice::Retry);
	}
}

// vim: ts=4
