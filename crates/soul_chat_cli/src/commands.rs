#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Status,
    Dismiss,
    Quit,
    Unknown(String),
}

pub const HELP_TEXT: &str = "Commands: /help, /status, /dismiss, /quit";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let command = trimmed
        .split_whitespace()
        .next()
        .unwrap_or(trimmed)
        .to_string();

    let parsed = match command.as_str() {
        "/help" => SlashCommand::Help,
        "/status" => SlashCommand::Status,
        "/dismiss" => SlashCommand::Dismiss,
        "/quit" | "/exit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_slash_command("hello /quit"), None);
    }

    #[test]
    fn known_commands_ignore_arguments_and_padding() {
        assert_eq!(parse_slash_command("  /quit now "), Some(SlashCommand::Quit));
        assert_eq!(parse_slash_command("/dismiss"), Some(SlashCommand::Dismiss));
        assert_eq!(parse_slash_command("/status"), Some(SlashCommand::Status));
    }

    #[test]
    fn unknown_commands_keep_their_name() {
        assert_eq!(
            parse_slash_command("/reload all"),
            Some(SlashCommand::Unknown("/reload".to_string()))
        );
    }
}
