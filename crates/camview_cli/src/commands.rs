//! Interactive commands read from stdin.

use camview_core::models::SourceId;

pub const HELP: &str = "commands: start | stop | test [1|2] | url 1|2 [address] | switch 1|2 | dual on|off | status | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    /// Probe one camera, or all of them.
    Test(Option<SourceId>),
    /// Change an address; prompts when none is given.
    Url(SourceId, Option<String>),
    Switch(SourceId),
    Dual(bool),
    Status,
    Help,
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };

        let camera = |word: Option<&str>| -> Result<SourceId, String> {
            let word = word.ok_or_else(|| format!("'{}' needs a camera number", verb))?;
            SourceId::from_number(word).ok_or_else(|| format!("no camera '{}'", word))
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "start" => ConsoleCommand::Start,
            "stop" => ConsoleCommand::Stop,
            "test" => match words.next() {
                Some(word) => ConsoleCommand::Test(Some(camera(Some(word))?)),
                None => ConsoleCommand::Test(None),
            },
            "url" => {
                let id = camera(words.next())?;
                ConsoleCommand::Url(id, words.next().map(str::to_string))
            }
            "switch" => ConsoleCommand::Switch(camera(words.next())?),
            "dual" => match words.next().map(str::to_ascii_lowercase).as_deref() {
                Some("on") => ConsoleCommand::Dual(true),
                Some("off") => ConsoleCommand::Dual(false),
                _ => return Err("usage: dual on|off".to_string()),
            },
            "status" => ConsoleCommand::Status,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" | "q" => ConsoleCommand::Quit,
            other => return Err(format!("unknown command '{}'", other)),
        };
        Ok(Some(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camera_arguments() {
        assert_eq!(
            ConsoleCommand::parse("test 2").unwrap(),
            Some(ConsoleCommand::Test(Some(SourceId::SECONDARY)))
        );
        assert_eq!(
            ConsoleCommand::parse("url 1 rtsp://10.0.0.2/live").unwrap(),
            Some(ConsoleCommand::Url(
                SourceId::PRIMARY,
                Some("rtsp://10.0.0.2/live".to_string())
            ))
        );
        assert_eq!(
            ConsoleCommand::parse("  SWITCH 2 ").unwrap(),
            Some(ConsoleCommand::Switch(SourceId::SECONDARY))
        );
    }

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(ConsoleCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn bad_input_is_reported() {
        assert!(ConsoleCommand::parse("switch").is_err());
        assert!(ConsoleCommand::parse("switch 3").is_err());
        assert!(ConsoleCommand::parse("dual maybe").is_err());
        assert!(ConsoleCommand::parse("record").is_err());
    }
}
