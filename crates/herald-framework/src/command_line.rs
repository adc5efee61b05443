//! Text command lines → interactions.
//!
//! Chat and console transports receive plain text rather than structured
//! interactions. [`CommandLineParser`] turns a line such as
//!
//! ```text
//! greet name:"Alice Smith" times:2
//! ```
//!
//! into an [`Interaction`] labelled `greet` with options `name` and `times`.
//! Leading bare words form the label (`admin ban user:bob` routes to
//! `admin ban`). A bare word after an option continues that option's value,
//! so `echo text:hello world` sets `text` to `hello world`.
//!
//! A line starting with the help label (`help greet`) becomes a help
//! interaction asking about the rest of the line.

use herald_core::Interaction;

use crate::error::ParseError;

/// The label that turns a line into a help request unless configured
/// otherwise.
pub const DEFAULT_HELP_LABEL: &str = "help";

/// The option a help interaction carries its target in.
pub const HELP_TARGET_OPTION: &str = "command";

/// Shell-like splitting: whitespace separates words, single and double
/// quotes group them, and a backslash inside double quotes escapes the next
/// character.
pub fn shell_split(input: &str) -> Result<Vec<String>, ParseError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_double_quote => escape_next = true,
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                in_word = true;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                in_word = true;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            _ => {
                current.push(ch);
                in_word = true;
            }
        }
    }

    if in_single_quote {
        return Err(ParseError::UnterminatedQuote('\''));
    }
    if in_double_quote {
        return Err(ParseError::UnterminatedQuote('"'));
    }
    if in_word {
        args.push(current);
    }
    Ok(args)
}

/// Parses text command lines.
#[derive(Debug, Clone)]
pub struct CommandLineParser {
    help_label: String,
}

impl Default for CommandLineParser {
    fn default() -> Self {
        Self::new(DEFAULT_HELP_LABEL)
    }
}

impl CommandLineParser {
    pub fn new(help_label: impl Into<String>) -> Self {
        Self {
            help_label: help_label.into(),
        }
    }

    pub fn help_label(&self) -> &str {
        &self.help_label
    }

    /// Parses `line` as sent by `user_id` in `channel_id`.
    pub fn parse(
        &self,
        line: &str,
        user_id: &str,
        channel_id: &str,
    ) -> Result<Interaction, ParseError> {
        let words = shell_split(line)?;
        if words.is_empty() {
            return Err(ParseError::Empty);
        }

        let split = words
            .iter()
            .position(|word| word.contains(':'))
            .unwrap_or(words.len());
        let (label_words, rest) = words.split_at(split);
        if label_words.is_empty() {
            return Err(ParseError::MissingLabel);
        }
        let options = parse_options(rest)?;

        let interaction = if label_words[0] == self.help_label {
            let target = label_words[1..].join(" ");
            let help = Interaction::help(user_id, channel_id);
            if target.is_empty() {
                help
            } else {
                help.option(HELP_TARGET_OPTION, target)
            }
        } else {
            Interaction::command(label_words.join(" "), user_id, channel_id)
        };

        Ok(options
            .into_iter()
            .fold(interaction, |interaction, (name, value)| {
                interaction.option(name, value)
            }))
    }
}

/// `name:value` pairs; bare words extend the previous value.
fn parse_options(words: &[String]) -> Result<Vec<(String, String)>, ParseError> {
    let mut options: Vec<(String, String)> = Vec::new();
    for word in words {
        match word.split_once(':') {
            Some(("", _)) => return Err(ParseError::InvalidOption(word.clone())),
            Some((name, value)) => options.push((name.to_string(), value.to_string())),
            None => {
                // the first word after the label always contains ':'
                if let Some((_, value)) = options.last_mut() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(word);
                }
            }
        }
    }
    Ok(options)
}

/// Parses `line` with the default help label.
pub fn parse_command_line(
    line: &str,
    user_id: &str,
    channel_id: &str,
) -> Result<Interaction, ParseError> {
    CommandLineParser::default().parse(line, user_id, channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Interaction, ParseError> {
        parse_command_line(line, "alice", "console")
    }

    #[test]
    fn test_shell_split_quoted() {
        assert_eq!(
            shell_split(r#"greet name:"Alice Smith" 'x y'"#).unwrap(),
            ["greet", "name:Alice Smith", "x y"]
        );
        assert_eq!(shell_split(r#"say "a \"b\"""#).unwrap(), ["say", r#"a "b""#]);
        assert_eq!(shell_split(r#"echo text:"""#).unwrap(), ["echo", "text:"]);
        assert!(shell_split("   \t ").unwrap().is_empty());
    }

    #[test]
    fn test_shell_split_unterminated() {
        assert_eq!(
            shell_split(r#"greet name:"Alice"#),
            Err(ParseError::UnterminatedQuote('"'))
        );
        assert_eq!(
            shell_split("greet name:'Alice"),
            Err(ParseError::UnterminatedQuote('\''))
        );
    }

    #[test]
    fn test_label_and_options() {
        let interaction = parse("greet name:Alice times:2").unwrap();
        assert_eq!(interaction.label(), "greet");
        assert_eq!(interaction.option_value("name"), Some("Alice"));
        assert_eq!(interaction.option_value("times"), Some("2"));
        assert!(!interaction.is_help());
    }

    #[test]
    fn test_multi_word_label() {
        let interaction = parse("admin ban user:bob").unwrap();
        assert_eq!(interaction.label(), "admin ban");
        assert_eq!(interaction.session_key().channel_id, "console");
    }

    #[test]
    fn test_bare_words_continue_value() {
        let interaction = parse("echo text:hello brave   world").unwrap();
        assert_eq!(interaction.option_value("text"), Some("hello brave world"));
    }

    #[test]
    fn test_value_may_contain_colons() {
        let interaction = parse("remind at:12:30").unwrap();
        assert_eq!(interaction.option_value("at"), Some("12:30"));
    }

    #[test]
    fn test_help_lines() {
        let help = parse("help admin ban").unwrap();
        assert!(help.is_help());
        assert_eq!(help.help_target(), "admin ban");

        let generic = parse("help").unwrap();
        assert!(generic.is_help());
        assert_eq!(generic.help_target(), "");

        let custom = CommandLineParser::new("?")
            .parse("? greet", "alice", "console")
            .unwrap();
        assert_eq!(custom.help_target(), "greet");
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse("   ").unwrap_err(), ParseError::Empty);
        assert_eq!(parse("name:Alice").unwrap_err(), ParseError::MissingLabel);
        assert_eq!(
            parse("greet :Alice").unwrap_err(),
            ParseError::InvalidOption(":Alice".into())
        );
    }
}
